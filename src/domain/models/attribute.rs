//! Schema-free facility attributes and their persisted (body, tag) encoding.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::DomainError;

/// Type tag persisted next to every serialized attribute body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Boolean,
    Integer,
    Float,
    Json,
    Text,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Boolean => "boolean",
            AttributeType::Integer => "integer",
            AttributeType::Float => "float",
            AttributeType::Json => "json",
            AttributeType::Text => "text",
        }
    }

    /// Unrecognised tags are read back as plain text.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "boolean" => AttributeType::Boolean,
            "integer" => AttributeType::Integer,
            "float" => AttributeType::Float,
            "json" => AttributeType::Json,
            _ => AttributeType::Text,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed attribute value. Serializes to the bare JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeType {
        match self {
            AttributeValue::Boolean(_) => AttributeType::Boolean,
            AttributeValue::Integer(_) => AttributeType::Integer,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::Text(_) => AttributeType::Text,
            AttributeValue::Json(_) => AttributeType::Json,
        }
    }

    /// Serializes the value into its persisted body and type tag.
    pub fn encode(&self) -> (String, AttributeType) {
        let body = match self {
            AttributeValue::Boolean(flag) => flag.to_string(),
            AttributeValue::Integer(number) => number.to_string(),
            AttributeValue::Float(number) => format_float(*number),
            AttributeValue::Text(text) => text.clone(),
            AttributeValue::Json(value) => value.to_string(),
        };
        (body, self.kind())
    }

    /// Rebuilds a value from a persisted body and tag.
    ///
    /// Numeric bodies that fail to parse indicate corruption and are reported
    /// as [`DomainError::Codec`]. A json body that no longer parses is handed
    /// back as text.
    pub fn decode(body: &str, tag: AttributeType) -> Result<Self, DomainError> {
        match tag {
            AttributeType::Json => Ok(serde_json::from_str::<Value>(body)
                .map(AttributeValue::Json)
                .unwrap_or_else(|_| AttributeValue::Text(body.to_string()))),
            AttributeType::Boolean => {
                Ok(AttributeValue::Boolean(body.eq_ignore_ascii_case("true")))
            }
            AttributeType::Integer => body
                .trim()
                .parse::<i64>()
                .map(AttributeValue::Integer)
                .map_err(|err| {
                    DomainError::codec(format!("integer attribute body {body:?} is unreadable: {err}"))
                }),
            AttributeType::Float => body
                .trim()
                .parse::<f64>()
                .map(AttributeValue::Float)
                .map_err(|err| {
                    DomainError::codec(format!("float attribute body {body:?} is unreadable: {err}"))
                }),
            AttributeType::Text => Ok(AttributeValue::Text(body.to_string())),
        }
    }

    /// The textual form used by substring attribute filters.
    pub fn to_stored_text(&self) -> String {
        self.encode().0
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Boolean(flag) => Value::Bool(*flag),
            AttributeValue::Integer(number) => Value::from(*number),
            AttributeValue::Float(number) => Value::from(*number),
            AttributeValue::Text(text) => Value::String(text.clone()),
            AttributeValue::Json(value) => value.clone(),
        }
    }
}

// Whole floats keep a trailing ".0" so they stay distinguishable from integers.
fn format_float(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 {
        format!("{number:.1}")
    } else {
        number.to_string()
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(flag) => AttributeValue::Boolean(flag),
            Value::Number(number) => match number.as_i64() {
                Some(whole) => AttributeValue::Integer(whole),
                None => AttributeValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(text) => AttributeValue::Text(text),
            Value::Array(_) | Value::Object(_) => AttributeValue::Json(value),
            Value::Null => AttributeValue::Text("null".into()),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(AttributeValue::from)
    }
}
