use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// A telemetry value as exposed to the view, after the platform's string encoding has been undone.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValue {
    Scalar(Scalar),
    Composite(Map<String, Value>),
    List(Vec<Value>),
    // The platform sent a string that is not valid JSON, kept verbatim
    Raw(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Normalizes a value received from the platform. Strings are parsed as JSON, a parse failure keeps the raw
    /// string instead of failing.
    pub fn normalize(value: Value) -> Self {
        match value {
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::String(inner)) => SampleValue::Scalar(Scalar::Text(inner)),
                Ok(parsed) => Self::from_structured(parsed),
                Err(_) => SampleValue::Raw(text),
            },
            other => Self::from_structured(other),
        }
    }

    fn from_structured(value: Value) -> Self {
        match value {
            Value::Null => SampleValue::Scalar(Scalar::Null),
            Value::Bool(b) => SampleValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => SampleValue::Scalar(n.as_f64().map_or(Scalar::Null, Scalar::Number)),
            Value::String(s) => SampleValue::Scalar(Scalar::Text(s)),
            Value::Array(items) => SampleValue::List(items),
            Value::Object(map) => SampleValue::Composite(map),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            SampleValue::Composite(map) => map.get(name),
            _ => None,
        }
    }

    /// Reads a composite sub-field as a number, accepting numeric text the way the dashboard widgets do.
    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(value_as_f64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Scalar(Scalar::Number(n)) => Some(*n),
            SampleValue::Scalar(Scalar::Text(s)) | SampleValue::Raw(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, SampleValue::Raw(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            SampleValue::Scalar(Scalar::Null) => Value::Null,
            SampleValue::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            SampleValue::Scalar(Scalar::Number(n)) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            SampleValue::Scalar(Scalar::Text(s)) | SampleValue::Raw(s) => Value::String(s.clone()),
            SampleValue::Composite(map) => Value::Object(map.clone()),
            SampleValue::List(items) => Value::Array(items.clone()),
        }
    }
}

impl Display for SampleValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleValue::Scalar(Scalar::Null) => write!(f, "null"),
            SampleValue::Scalar(Scalar::Bool(b)) => write!(f, "{}", b),
            SampleValue::Scalar(Scalar::Number(n)) => write!(f, "{}", n),
            SampleValue::Scalar(Scalar::Text(s)) | SampleValue::Raw(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_value()),
        }
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interprets booleans stored either natively or as `"true"`/`"false"` text.
pub(crate) fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

/// The latest known value of one telemetry key. Timestamps are epoch milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub key: String,
    pub ts: i64,
    pub value: SampleValue,
}

impl TelemetrySample {
    pub fn new(key: impl Into<String>, ts: i64, value: Value) -> Self {
        TelemetrySample {
            key: key.into(),
            ts,
            value: SampleValue::normalize(value),
        }
    }
}
