use serde_json::Value as JsonValue;

use crate::{BodyFormat, OptionValue, RequestError, Result};

/// Payload already encoded for the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PreparedBody {
    Json(Vec<u8>),
    Form(String),
    /// Text fields sent as `multipart/form-data`.
    Multipart(Vec<(String, String)>),
}

impl PreparedBody {
    pub(crate) fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Multipart(_) => None,
        }
    }
}

/// Encodes a `PostFields` value for `format`.
///
/// Text is sent as-is: verbatim JSON for [`BodyFormat::Json`], otherwise as an
/// already url-encoded form body.
pub(crate) fn prepare_payload(
    payload: &OptionValue,
    format: Option<BodyFormat>,
) -> Result<PreparedBody> {
    match payload {
        OptionValue::Text(raw) => Ok(match format {
            Some(BodyFormat::Json) => PreparedBody::Json(raw.clone().into_bytes()),
            _ => PreparedBody::Form(raw.clone()),
        }),
        OptionValue::Data(data) => prepare_body(data, format),
        _ => Err(RequestError::Encode(
            "payload must be structured data or raw text".to_owned(),
        )),
    }
}

/// Encodes `data` for `format`.
///
/// Without a format the payload is sent as multipart form fields.
pub(crate) fn prepare_body(data: &JsonValue, format: Option<BodyFormat>) -> Result<PreparedBody> {
    match format {
        Some(BodyFormat::Json) => serde_json::to_vec(data)
            .map(PreparedBody::Json)
            .map_err(|err| RequestError::Encode(format!("invalid json payload: {err}"))),
        Some(BodyFormat::Form) => {
            let fields = flat_fields(data)?;
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter().map(|(key, value)| (key.as_str(), value.as_str())))
                .finish();
            Ok(PreparedBody::Form(encoded))
        }
        None => flat_fields(data).map(PreparedBody::Multipart),
    }
}

fn flat_fields(data: &JsonValue) -> Result<Vec<(String, String)>> {
    match data {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => {
            let fields = items.iter().map(pair_field).collect::<Result<Vec<_>>>()?;
            Ok(fields.into_iter().flatten().collect())
        }
        JsonValue::Object(map) => {
            let mut fields = Vec::with_capacity(map.len());
            for (key, value) in map {
                if let Some(text) = field_text(key, value)? {
                    fields.push((key.clone(), text));
                }
            }
            Ok(fields)
        }
        other => Err(RequestError::Encode(format!(
            "form payload must be an object or a list of [name, value] pairs, got {}",
            kind_name(other)
        ))),
    }
}

// `[name, value]`, the shape a serialized `&[(K, V)]` takes.
fn pair_field(item: &JsonValue) -> Result<Option<(String, String)>> {
    match item.as_array().map(Vec::as_slice) {
        Some([JsonValue::String(name), value]) => {
            Ok(field_text(name, value)?.map(|text| (name.clone(), text)))
        }
        _ => Err(RequestError::Encode(format!(
            "form payload list entries must be [name, value] pairs, got {item}"
        ))),
    }
}

fn field_text(key: &str, value: &JsonValue) -> Result<Option<String>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Bool(flag) => Ok(Some(if *flag { "1" } else { "0" }.to_owned())),
        JsonValue::Number(number) => Ok(Some(number.to_string())),
        JsonValue::String(text) => Ok(Some(text.clone())),
        other => Err(RequestError::Encode(format!(
            "form field '{key}' must be a scalar, got {}",
            kind_name(other)
        ))),
    }
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
