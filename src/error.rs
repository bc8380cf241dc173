use crate::options::OptionKey;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// The composed request URL could not be parsed.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    /// A flattened header line is not a valid HTTP header.
    #[error("invalid header line '{0}'")]
    InvalidHeader(String),
    /// An option carried a value of the wrong shape for its key.
    #[error("invalid value for option {key:?}: {reason}")]
    InvalidOption {
        /// Offending option key.
        key: OptionKey,
        /// Why the value was rejected.
        reason: String,
    },
    /// Request payload could not be encoded for the selected body format.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Malformed `WWW-Authenticate: Digest` challenge.
    #[error("digest auth error: {0}")]
    Digest(String),
}

impl RequestError {
    /// Returns `true` for failures raised while talking to the remote end.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
