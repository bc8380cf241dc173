use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
    multipart::Form,
    redirect::Policy,
    Method, StatusCode,
};
use url::Url;

use crate::{
    body::{prepare_payload, PreparedBody},
    digest::{client_nonce, DigestChallenge},
    AuthMode, BodyFormat, HeaderBag, OptionBag, OptionKey, OptionValue, RequestError, Result,
};

const MAX_REDIRECTS: usize = 10;

/// Raw outcome of one successful transport call.
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Response headers; empty unless header capture was requested.
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Final URL after redirects.
    pub url: String,
    /// Outbound `"Key: Value"` lines, when request header recording was requested.
    pub request_headers: Vec<String>,
}

/// Connection handle that performs the network I/O for a builder.
///
/// `configure` applies a flat option bag with overwrite semantics: keys in the
/// bag replace earlier settings, keys not in the bag keep them. `perform` runs
/// the configured request. Calling `perform` repeatedly without reconfiguring
/// must issue the same request again.
pub trait Transport {
    fn configure(&mut self, options: &OptionBag) -> Result<()>;

    fn perform(&mut self) -> impl Future<Output = Result<RawResponse>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ClientSettings {
    verify_peer: bool,
    verify_host: bool,
    connect_timeout: Option<Duration>,
    follow_location: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_host: true,
            connect_timeout: None,
            follow_location: false,
        }
    }
}

/// Default [`Transport`] backed by `reqwest`.
///
/// The underlying `reqwest::Client` is created lazily and kept across
/// attempts and sends; it is rebuilt only when a TLS, connect-timeout or
/// redirect option changes. The payload (`PostFields`) is the one setting
/// that does not outlive a `configure` call.
#[derive(Default)]
pub struct HttpTransport {
    client: Option<reqwest::Client>,
    client_settings: ClientSettings,
    url: Option<Url>,
    method: Method,
    custom_method: Option<Method>,
    payload: Option<OptionValue>,
    body_format: Option<BodyFormat>,
    body: Option<PreparedBody>,
    no_body: bool,
    auth: Option<AuthMode>,
    credentials: Option<(String, String)>,
    timeout: Option<Duration>,
    return_transfer: bool,
    capture_headers: bool,
    record_request_headers: bool,
    headers: HeaderMap,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("method", &self.effective_method())
            .field("auth", &self.auth)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("client_settings", &self.client_settings)
            .finish()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_method(&self) -> Method {
        self.custom_method.clone().unwrap_or_else(|| self.method.clone())
    }

    fn apply(&mut self, key: &OptionKey, value: &OptionValue, client: &mut ClientSettings) -> Result<()> {
        match key {
            OptionKey::Url => {
                let text = expect_text(key, value)?;
                let url = Url::parse(text).map_err(|err| RequestError::InvalidUrl {
                    url: text.to_owned(),
                    reason: err.to_string(),
                })?;
                self.url = Some(url);
            }
            OptionKey::CustomRequest => {
                let text = expect_text(key, value)?;
                let method = Method::from_bytes(text.as_bytes())
                    .map_err(|err| invalid_option(key, err.to_string()))?;
                self.custom_method = Some(method);
            }
            OptionKey::HttpGet => {
                if expect_bool(key, value)? {
                    self.method = Method::GET;
                    self.payload = None;
                    self.no_body = false;
                }
            }
            OptionKey::Post => {
                if expect_bool(key, value)? {
                    self.method = Method::POST;
                    self.no_body = false;
                }
            }
            OptionKey::PostFields => match value {
                OptionValue::Data(_) | OptionValue::Text(_) => self.payload = Some(value.clone()),
                _ => return Err(invalid_option(key, "expected payload data or raw text")),
            },
            OptionKey::NoBody => {
                self.no_body = expect_bool(key, value)?;
                if self.no_body {
                    self.method = Method::HEAD;
                }
            }
            OptionKey::HttpAuth => match value {
                OptionValue::Auth(mode) => self.auth = Some(*mode),
                _ => return Err(invalid_option(key, "expected auth mode")),
            },
            OptionKey::UserPwd => {
                let text = expect_text(key, value)?;
                let (user, pass) = text.split_once(':').unwrap_or((text, ""));
                self.credentials = Some((user.to_owned(), pass.to_owned()));
            }
            OptionKey::SslVerifyPeer => client.verify_peer = expect_bool(key, value)?,
            OptionKey::SslVerifyHost => client.verify_host = expect_bool(key, value)?,
            OptionKey::Timeout => {
                let seconds = expect_int(key, value)?;
                self.timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
            }
            OptionKey::ConnectTimeout => {
                let seconds = expect_int(key, value)?;
                client.connect_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
            }
            OptionKey::FollowLocation => client.follow_location = expect_bool(key, value)?,
            OptionKey::ReturnTransfer => self.return_transfer = expect_bool(key, value)?,
            OptionKey::Header => self.capture_headers = expect_bool(key, value)?,
            OptionKey::HeaderOut => self.record_request_headers = expect_bool(key, value)?,
            OptionKey::HttpHeader => {
                let lines = value
                    .as_lines()
                    .ok_or_else(|| invalid_option(key, "expected header lines"))?;
                self.headers = header_map_from_lines(lines)?;
            }
            OptionKey::BodyFormat => match value {
                OptionValue::Format(format) => self.body_format = Some(*format),
                _ => return Err(invalid_option(key, "expected body format")),
            },
            OptionKey::Custom(_name) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("http transport ignores custom option '{}'", _name);
            }
        }
        Ok(())
    }

    fn ensure_client(&mut self) -> Result<reqwest::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let settings = &self.client_settings;

        #[cfg(feature = "tracing")]
        tracing::debug!("building http client with {:?}", settings);

        let redirect = if settings.follow_location {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.verify_peer)
            .danger_accept_invalid_hostnames(!settings.verify_host)
            .redirect(redirect);
        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder.build().map_err(RequestError::Transport)?;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: Url,
        authorization: Option<String>,
    ) -> Result<reqwest::Request> {
        let mut headers = self.headers.clone();
        if let Some(body) = &self.body {
            match body.default_content_type() {
                Some(content_type) if !headers.contains_key(CONTENT_TYPE) => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                // multipart sets its own boundary-carrying content type
                None => {
                    headers.remove(CONTENT_TYPE);
                }
                Some(_) => {}
            }
        }

        let mut builder = client.request(method, url).headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some((user, pass)) = &self.credentials {
            match self.auth {
                Some(AuthMode::Basic) => builder = builder.basic_auth(user, Some(pass)),
                Some(AuthMode::Digest) => {
                    if let Some(value) = authorization {
                        builder = builder.header(AUTHORIZATION, value);
                    }
                }
                None => {}
            }
        }

        builder = match &self.body {
            Some(PreparedBody::Json(bytes)) => builder.body(bytes.clone()),
            Some(PreparedBody::Form(encoded)) => builder.body(encoded.clone()),
            Some(PreparedBody::Multipart(fields)) => {
                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()));
                builder.multipart(form)
            }
            None => builder,
        };

        builder.build().map_err(RequestError::Transport)
    }

    async fn execute(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: Url,
        authorization: Option<String>,
    ) -> Result<(reqwest::Response, Vec<String>)> {
        let request = self.build_request(client, method, url, authorization)?;
        let request_headers = if self.record_request_headers {
            header_lines(request.headers())
        } else {
            Vec::new()
        };
        let response = client.execute(request).await.map_err(RequestError::Transport)?;
        Ok((response, request_headers))
    }

    fn digest_authorization(
        &self,
        response: &reqwest::Response,
        method: &Method,
        url: &Url,
    ) -> Result<Option<String>> {
        if response.status() != StatusCode::UNAUTHORIZED || self.auth != Some(AuthMode::Digest) {
            return Ok(None);
        }
        let Some((user, pass)) = &self.credentials else {
            return Ok(None);
        };

        let challenge = response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| DigestChallenge::parse(value).transpose())
            .transpose()?;
        let Some(challenge) = challenge else {
            return Ok(None);
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("answering digest challenge for {}", url);

        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_owned(),
        };
        Ok(Some(challenge.authorization(
            user,
            pass,
            method.as_str(),
            &uri,
            &client_nonce(),
            1,
        )))
    }
}

impl Transport for HttpTransport {
    fn configure(&mut self, options: &OptionBag) -> Result<()> {
        // the payload belongs to a single request; every other setting persists
        self.payload = None;
        let mut client = self.client_settings.clone();
        for (key, value) in options.iter() {
            self.apply(key, value, &mut client)?;
        }

        self.body = self
            .payload
            .as_ref()
            .map(|payload| prepare_payload(payload, self.body_format))
            .transpose()?;

        if client != self.client_settings {
            self.client_settings = client;
            self.client = None;
        }
        Ok(())
    }

    async fn perform(&mut self) -> Result<RawResponse> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| invalid_option(&OptionKey::Url, "no url configured"))?;
        let method = self.effective_method();
        let client = self.ensure_client()?;

        let (mut response, mut request_headers) = self
            .execute(&client, method.clone(), url.clone(), None)
            .await?;
        if let Some(authorization) = self.digest_authorization(&response, &method, &url)? {
            (response, request_headers) = self
                .execute(&client, method.clone(), url, Some(authorization))
                .await?;
        }

        let status = response.status();
        let headers = if self.capture_headers {
            response.headers().clone()
        } else {
            HeaderMap::new()
        };
        let final_url = response.url().to_string();
        let skip_body = self.no_body && method == Method::HEAD;
        let body = if skip_body || !self.return_transfer {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map_err(RequestError::Transport)?
                .to_vec()
        };

        Ok(RawResponse {
            status,
            headers,
            body,
            url: final_url,
            request_headers,
        })
    }
}

fn header_map_from_lines(lines: &[String]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(lines.len());
    for line in lines {
        let (name, value) =
            HeaderBag::split_line(line).ok_or_else(|| RequestError::InvalidHeader(line.clone()))?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::InvalidHeader(line.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| RequestError::InvalidHeader(line.clone()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn header_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
        .collect()
}

fn invalid_option(key: &OptionKey, reason: impl Into<String>) -> RequestError {
    RequestError::InvalidOption {
        key: key.clone(),
        reason: reason.into(),
    }
}

fn expect_bool(key: &OptionKey, value: &OptionValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| invalid_option(key, "expected boolean"))
}

fn expect_int(key: &OptionKey, value: &OptionValue) -> Result<u64> {
    value
        .as_int()
        .ok_or_else(|| invalid_option(key, "expected integer"))
}

fn expect_text<'a>(key: &OptionKey, value: &'a OptionValue) -> Result<&'a str> {
    value
        .as_text()
        .ok_or_else(|| invalid_option(key, "expected text"))
}
