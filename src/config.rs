use std::time::Duration;

use crate::{BodyFormat, HeaderBag, OptionBag};

/// Attempts made by `send` when no retry policy was configured.
pub const DEFAULT_TRIES: usize = 1;

/// Delay between attempts when no retry policy was configured.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Accumulated request configuration owned by a `RequestBuilder`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestConfig {
    /// Prefix joined in front of every request path.
    pub base_url: Option<String>,
    /// Serialization for the payload of write verbs.
    pub body_format: Option<BodyFormat>,
    /// Header multi-map; values accumulate across calls.
    pub headers: HeaderBag,
    /// Every other transport option; last write wins.
    pub options: OptionBag,
    /// Total number of attempts, including the first one.
    pub tries: Option<usize>,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: Option<u64>,
}

impl RequestConfig {
    /// Number of attempts a send makes. Never less than one.
    pub fn effective_tries(&self) -> usize {
        self.tries.unwrap_or(DEFAULT_TRIES).max(1)
    }

    pub fn effective_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    /// Joins the base URL and `path` with exactly one slash.
    ///
    /// Without a base URL the path is used as given.
    pub fn compose_url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) => join_url(base, path),
            None => path.to_owned(),
        }
    }
}

/// Trims one trailing slash from `base` and one leading slash from `path`,
/// then joins them with a single slash.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{join_url, RequestConfig};

    #[test]
    fn join_is_independent_of_slashes_at_the_seam() {
        let expected = "https://api.example.com/v1/users";
        for base in ["https://api.example.com", "https://api.example.com/"] {
            for path in ["v1/users", "/v1/users"] {
                assert_eq!(join_url(base, path), expected, "{base} + {path}");
            }
        }
    }

    #[test]
    fn join_trims_only_one_slash() {
        assert_eq!(join_url("https://a//", "//b"), "https://a///b");
    }

    #[test]
    fn compose_without_base_keeps_path() {
        let config = RequestConfig::default();
        assert_eq!(config.compose_url("https://x/y"), "https://x/y");
    }

    #[test]
    fn defaults_try_once_with_fallback_delay() {
        let config = RequestConfig::default();
        assert_eq!(config.effective_tries(), 1);
        assert_eq!(config.effective_retry_delay(), Duration::from_millis(100));
    }

    #[test]
    fn zero_tries_still_attempts_once() {
        let config = RequestConfig {
            tries: Some(0),
            retry_delay_ms: Some(0),
            ..RequestConfig::default()
        };
        assert_eq!(config.effective_tries(), 1);
        assert_eq!(config.effective_retry_delay(), Duration::ZERO);
    }
}
