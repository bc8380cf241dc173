use serde_json::Value as JsonValue;

/// Symbolic option identifiers shared with the transport layer.
///
/// Names follow the curl option vocabulary so that a transport can map them
/// one to one onto its own settings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Absolute request URL.
    Url,
    /// Method string sent on the request line.
    CustomRequest,
    /// Marks the request as a plain GET.
    HttpGet,
    /// Marks the request as a POST.
    Post,
    /// Request payload.
    PostFields,
    /// No response body is expected.
    NoBody,
    /// Authentication scheme, see [`AuthMode`].
    HttpAuth,
    /// `"user:pass"` credentials for [`OptionKey::HttpAuth`].
    UserPwd,
    SslVerifyPeer,
    SslVerifyHost,
    /// Whole-request timeout in seconds.
    Timeout,
    /// Connect timeout in seconds.
    ConnectTimeout,
    FollowLocation,
    /// Return the body as a value instead of writing it out.
    ReturnTransfer,
    /// Capture response headers.
    Header,
    /// Record outbound request headers on the response.
    HeaderOut,
    /// Flattened `"Key: Value"` header lines.
    HttpHeader,
    /// Body serialization for the payload, see [`BodyFormat`].
    BodyFormat,
    /// Transport-specific flag with no dedicated key.
    Custom(String),
}

/// Authentication scheme selected by `with_basic_auth` / `with_digest_auth`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    Digest,
}

/// Serialization applied to the payload of write verbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFormat {
    /// `application/json`.
    Json,
    /// `application/x-www-form-urlencoded` (`form_params`).
    Form,
}

/// Value stored under an [`OptionKey`].
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(u64),
    Text(String),
    Lines(Vec<String>),
    Auth(AuthMode),
    Format(BodyFormat),
    Data(JsonValue),
}

impl OptionValue {
    /// Boolean value; a non-zero integer counts as `true`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Integer value, if this is an [`OptionValue::Int`].
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Text value, if this is an [`OptionValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Header lines, if this is an [`OptionValue::Lines`].
    pub fn as_lines(&self) -> Option<&[String]> {
        match self {
            Self::Lines(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u64> for OptionValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        Self::Lines(value)
    }
}

impl From<AuthMode> for OptionValue {
    fn from(value: AuthMode) -> Self {
        Self::Auth(value)
    }
}

impl From<BodyFormat> for OptionValue {
    fn from(value: BodyFormat) -> Self {
        Self::Format(value)
    }
}

impl From<JsonValue> for OptionValue {
    fn from(value: JsonValue) -> Self {
        Self::Data(value)
    }
}

/// Flat option bag with last-write-wins semantics.
///
/// Keys keep the position of their first insertion; setting an existing key
/// replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionBag {
    entries: Vec<(OptionKey, OptionValue)>,
}

impl OptionBag {
    /// Creates an empty option bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any earlier value.
    pub fn set(&mut self, key: OptionKey, value: impl Into<OptionValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Chaining variant of [`OptionBag::set`].
    pub fn with(mut self, key: OptionKey, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Overlays every entry of `other` onto `self`.
    pub fn extend(&mut self, other: OptionBag) {
        for (key, value) in other.entries {
            self.set(key, value);
        }
    }

    /// Value currently stored under `key`.
    pub fn get(&self, key: &OptionKey) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, key: &OptionKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OptionKey, &OptionValue)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }
}

impl<V: Into<OptionValue>> FromIterator<(OptionKey, V)> for OptionBag {
    fn from_iter<I: IntoIterator<Item = (OptionKey, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (key, value) in iter {
            bag.set(key, value);
        }
        bag
    }
}

impl IntoIterator for OptionBag {
    type Item = (OptionKey, OptionValue);
    type IntoIter = std::vec::IntoIter<(OptionKey, OptionValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
