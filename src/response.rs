use std::borrow::Cow;

use reqwest::{header::HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::{transport::RawResponse, RequestError, Result};

/// Response of a completed request.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    url: String,
    request_headers: Vec<String>,
}

impl Response {
    /// HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `true` for 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `true` for 4xx.
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// `true` for 5xx.
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of `name` if it is valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Raw body bytes; empty for HEAD.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|err| {
            RequestError::Decode(format!(
                "invalid json response: {err}; body: {}",
                self.text()
            ))
        })
    }

    /// Final URL after redirects.
    pub fn effective_url(&self) -> &str {
        &self.url
    }

    /// Outbound header lines as sent on the wire.
    pub fn request_headers(&self) -> &[String] {
        &self.request_headers
    }

    /// Consumes the response and returns its body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl From<RawResponse> for Response {
    fn from(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            url: raw.url,
            request_headers: raw.request_headers,
        }
    }
}
