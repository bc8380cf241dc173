use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::time::sleep;

use crate::{
    transport::{HttpTransport, Transport},
    AuthMode, BodyFormat, HeaderBag, OptionBag, OptionKey, OptionValue, RequestConfig,
    RequestError, Response, Result,
};

/// Fluent builder that accumulates request configuration and sends it
/// through a [`Transport`].
///
/// Configuration methods consume and return the builder. Verbs borrow it
/// mutably, so the accumulated configuration and the transport are reused
/// by later sends.
///
/// ```no_run
/// use reqchain::RequestBuilder;
///
/// # async fn run() -> reqchain::Result<()> {
/// let mut api = RequestBuilder::new()
///     .base_url("https://api.example.com/")
///     .as_json()
///     .with_token("secret")
///     .retry(3, 250);
///
/// let response = api.post("/v1/users", &serde_json::json!({ "name": "kit" })).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
pub struct RequestBuilder<T = HttpTransport> {
    transport: T,
    config: RequestConfig,
    /// First option `with_options` could not merge, reported by the next send.
    rejected: Option<(OptionKey, String)>,
}

impl<T: fmt::Debug> fmt::Debug for RequestBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.config.headers.iter().map(|(name, _)| name).collect();
        let option_keys: Vec<&OptionKey> = self.config.options.iter().map(|(key, _)| key).collect();
        f.debug_struct("RequestBuilder")
            .field("base_url", &self.config.base_url)
            .field("body_format", &self.config.body_format)
            .field("headers", &header_names)
            .field("options", &option_keys)
            .field("tries", &self.config.tries)
            .field("retry_delay_ms", &self.config.retry_delay_ms)
            .field("transport", &self.transport)
            .finish()
    }
}

impl RequestBuilder<HttpTransport> {
    /// Creates a builder backed by [`HttpTransport`].
    pub fn new() -> Self {
        Self::with_transport(HttpTransport::new())
    }
}

impl Default for RequestBuilder<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> RequestBuilder<T> {
    /// Creates a builder that sends through `transport`.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            config: RequestConfig::default(),
            rejected: None,
        }
    }

    /// Accumulated configuration.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Transport the builder sends through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Prefix joined onto every request path.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Serialization used for the payload of write verbs.
    pub fn body_format(mut self, format: BodyFormat) -> Self {
        self.config.body_format = Some(format);
        self
    }

    /// Adds a `Content-Type` header.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.with_headers([("Content-Type", content_type)])
    }

    /// Adds an `Accept` header.
    pub fn accept(self, content_type: impl Into<String>) -> Self {
        self.with_headers([("Accept", content_type)])
    }

    /// Adds `Accept: application/json`.
    pub fn accept_json(self) -> Self {
        self.accept("application/json")
    }

    /// Adds a `User-Agent` header.
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_headers([("User-Agent", user_agent)])
    }

    /// Adds headers; values for a key already present accumulate.
    ///
    /// Keys match case-insensitively and a value already recorded for the key
    /// is not added again, so `X: 1`, `X: 2`, `X: 1` is sent as `X: 1,2`.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Sends `username`/`password` with HTTP basic auth.
    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        self.with_auth(AuthMode::Basic, username, password)
    }

    /// Basic and digest auth share their option keys; the last call wins.
    pub fn with_digest_auth(self, username: &str, password: &str) -> Self {
        self.with_auth(AuthMode::Digest, username, password)
    }

    fn with_auth(mut self, mode: AuthMode, username: &str, password: &str) -> Self {
        self.config.options.set(OptionKey::HttpAuth, mode);
        self.config
            .options
            .set(OptionKey::UserPwd, format!("{username}:{password}"));
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn with_token(self, token: &str) -> Self {
        self.with_token_type(token, "Bearer")
    }

    /// Sets `Authorization: <kind> <token>`.
    pub fn with_token_type(self, token: &str, kind: &str) -> Self {
        let value = format!("{kind} {token}").trim().to_owned();
        self.with_headers([("Authorization", value)])
    }

    /// Sends the cookies as one `Cookie: k:v; k:v` header.
    ///
    /// `_domain` is accepted for call-site compatibility and is not encoded
    /// into the header.
    pub fn with_cookies<I, K, V>(self, cookies: I, _domain: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: fmt::Display,
        V: fmt::Display,
    {
        let value = cookies
            .into_iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join("; ");
        self.with_headers([("Cookie", value)])
    }

    /// Disables TLS peer and host verification.
    pub fn without_verifying(mut self) -> Self {
        self.config.options.set(OptionKey::SslVerifyHost, false);
        self.config.options.set(OptionKey::SslVerifyPeer, false);
        self
    }

    /// Request timeout in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.config.options.set(OptionKey::Timeout, seconds);
        self
    }

    /// `times` is the total number of attempts; `sleep_ms` the pause between them.
    pub fn retry(mut self, times: usize, sleep_ms: u64) -> Self {
        self.config.tries = Some(times);
        self.config.retry_delay_ms = Some(sleep_ms);
        self
    }

    /// Merges raw transport options.
    ///
    /// `HttpHeader` accumulates into the headers like
    /// [`RequestBuilder::with_headers`]. It accepts header lines, a single
    /// `"Key: Value"` text (one header per line) or a JSON object of scalars.
    /// `BodyFormat` selects the body format. Every other key replaces its
    /// previous value. A header or body format value of any other shape is
    /// reported as [`RequestError::InvalidOption`] by the next send.
    pub fn with_options(mut self, options: OptionBag) -> Self {
        for (key, value) in options {
            match (key, value) {
                (OptionKey::HttpHeader, value) => match header_lines(value) {
                    Some(lines) => {
                        for line in lines {
                            match HeaderBag::split_line(&line) {
                                Some((name, value)) => self.config.headers.insert(name, value),
                                None => self.config.headers.insert(line.clone(), ""),
                            }
                        }
                    }
                    None => self.reject(OptionKey::HttpHeader, "expected header lines"),
                },
                (OptionKey::BodyFormat, OptionValue::Format(format)) => {
                    self.config.body_format = Some(format);
                }
                (OptionKey::BodyFormat, _) => {
                    self.reject(OptionKey::BodyFormat, "expected body format");
                }
                (key, value) => self.config.options.set(key, value),
            }
        }
        self
    }

    fn reject(&mut self, key: OptionKey, reason: &str) {
        #[cfg(feature = "tracing")]
        tracing::debug!("with_options rejected {:?}: {}", key, reason);

        if self.rejected.is_none() {
            self.rejected = Some((key, reason.to_owned()));
        }
    }

    /// JSON body format plus `Content-Type: application/json`.
    pub fn as_json(self) -> Self {
        self.body_format(BodyFormat::Json)
            .content_type("application/json")
    }

    /// Url-encoded form body format plus its `Content-Type`.
    pub fn as_form(self) -> Self {
        self.body_format(BodyFormat::Form)
            .content_type("application/x-www-form-urlencoded")
    }

    /// Query parameters are part of `path`; they are not encoded here.
    pub async fn get(&mut self, path: &str) -> Result<Response> {
        let verb = OptionBag::new().with(OptionKey::HttpGet, true);
        self.send("GET", path, verb).await
    }

    /// Sends a POST with `data` as the payload.
    pub async fn post<D>(&mut self, path: &str, data: &D) -> Result<Response>
    where
        D: Serialize + ?Sized,
    {
        let verb = OptionBag::new()
            .with(OptionKey::Post, true)
            .with(OptionKey::PostFields, payload(data)?);
        self.send("POST", path, verb).await
    }

    /// Sends a PUT with `data` as the payload.
    pub async fn put<D>(&mut self, path: &str, data: &D) -> Result<Response>
    where
        D: Serialize + ?Sized,
    {
        let verb = OptionBag::new().with(OptionKey::PostFields, payload(data)?);
        self.send("PUT", path, verb).await
    }

    /// Sends a PATCH with `data` as the payload.
    pub async fn patch<D>(&mut self, path: &str, data: &D) -> Result<Response>
    where
        D: Serialize + ?Sized,
    {
        let verb = OptionBag::new().with(OptionKey::PostFields, payload(data)?);
        self.send("PATCH", path, verb).await
    }

    /// Sends a DELETE without a request body.
    pub async fn delete(&mut self, path: &str) -> Result<Response> {
        self.send("DELETE", path, OptionBag::new()).await
    }

    /// Sends a HEAD; the response carries no body.
    pub async fn head(&mut self, path: &str) -> Result<Response> {
        let verb = OptionBag::new().with(OptionKey::NoBody, true);
        self.send("HEAD", path, verb).await
    }

    /// Sends an OPTIONS request without a body.
    pub async fn options(&mut self, path: &str) -> Result<Response> {
        self.send("OPTIONS", path, OptionBag::new()).await
    }

    /// Configures the transport once, then performs up to
    /// [`RequestConfig::effective_tries`] attempts on the same handle.
    ///
    /// The error of the last attempt is returned unchanged.
    async fn send(&mut self, method: &str, path: &str, verb_options: OptionBag) -> Result<Response> {
        if let Some((key, reason)) = &self.rejected {
            return Err(RequestError::InvalidOption {
                key: key.clone(),
                reason: reason.clone(),
            });
        }

        let options = self.pending_options(method, path, verb_options);
        self.transport.configure(&options)?;

        let tries = self.config.effective_tries();
        let delay = self.config.effective_retry_delay();
        let mut attempt = 1usize;

        loop {
            match self.transport.perform().await {
                Ok(raw) => return Ok(Response::from(raw)),
                Err(_err) if attempt < tries => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "{} {} attempt {}/{} failed: {}; retrying in {} ms",
                        method,
                        path,
                        attempt,
                        tries,
                        _err,
                        delay.as_millis()
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("{} {} failed after {} attempt(s): {}", method, path, attempt, err);

                    return Err(err);
                }
            }
        }
    }

    /// Flat option bag for one send: accumulated options, then the verb's
    /// options, then the fixed send options and the flattened headers.
    fn pending_options(&self, method: &str, path: &str, verb_options: OptionBag) -> OptionBag {
        let mut options = self.config.options.clone();
        options.extend(verb_options);

        options.set(OptionKey::Url, self.config.compose_url(path));
        options.set(OptionKey::CustomRequest, method.to_ascii_uppercase());
        options.set(OptionKey::ReturnTransfer, true);
        options.set(OptionKey::Header, true);
        options.set(OptionKey::HeaderOut, true);

        if let Some(format) = self.config.body_format {
            options.set(OptionKey::BodyFormat, format);
        }
        if !self.config.headers.is_empty() {
            options.set(OptionKey::HttpHeader, self.config.headers.to_lines());
        }
        options
    }
}

/// Header lines carried by an `HttpHeader` option value, if it has a usable shape.
fn header_lines(value: OptionValue) -> Option<Vec<String>> {
    match value {
        OptionValue::Lines(lines) => Some(lines),
        OptionValue::Text(text) => Some(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
        ),
        OptionValue::Data(JsonValue::Object(map)) => map
            .into_iter()
            .map(|(name, value)| match value {
                JsonValue::String(text) => Some(format!("{name}: {text}")),
                JsonValue::Number(number) => Some(format!("{name}: {number}")),
                JsonValue::Bool(flag) => Some(format!("{name}: {flag}")),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

fn payload<D: Serialize + ?Sized>(data: &D) -> Result<JsonValue> {
    serde_json::to_value(data)
        .map_err(|err| RequestError::Encode(format!("request payload is not serializable: {err}")))
}
