//! `reqchain` is a fluent builder for outbound HTTP requests.
//!
//! Configuration accumulates across chained calls on a [`RequestBuilder`]:
//! headers merge key by key, every other option is last-write-wins. A verb
//! call ([`RequestBuilder::get`], [`RequestBuilder::post`], ...) flattens the
//! configuration into an [`OptionBag`], applies it to the builder's
//! [`Transport`] and performs the request with bounded retry:
//! - [`RequestBuilder::retry`] sets the total number of attempts and the delay
//! - only failed attempts are retried; any HTTP status is a completed attempt
//! - the error of the final attempt is returned unchanged

mod body;
mod builder;
mod config;
mod digest;
mod error;
mod headers;
mod options;
mod response;
mod transport;

pub use builder::RequestBuilder;
pub use config::{join_url, RequestConfig, DEFAULT_RETRY_DELAY_MS, DEFAULT_TRIES};
pub use error::RequestError;
pub use headers::HeaderBag;
pub use options::{AuthMode, BodyFormat, OptionBag, OptionKey, OptionValue};
pub use response::Response;
pub use transport::{HttpTransport, RawResponse, Transport};

pub type Result<T> = std::result::Result<T, RequestError>;
