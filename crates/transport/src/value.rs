use core::fmt;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone as _, Utc};

use crate::EncodeError;

/// Datetime rendering used by the control plane on the wire
pub const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%SZ";

/// Self-describing wire value. No schema is attached, meaning is imposed by
/// [`Decode`](crate::Decode) implementations.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Tag of a [`Value`] variant
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Kind {
    Int,
    Float,
    Bool,
    String,
    DateTime,
    List,
    Map,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Returns the variant tag
    pub fn kind(&self) -> Kind {
        match self {
            Self::Int(..) => Kind::Int,
            Self::Float(..) => Kind::Float,
            Self::Bool(..) => Kind::Bool,
            Self::String(..) => Kind::String,
            Self::DateTime(..) => Kind::DateTime,
            Self::List(..) => Kind::List,
            Self::Map(..) => Kind::Map,
        }
    }

    /// Returns the string payload, if this is a [`Value::String`]
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Converts a JSON document into a wire value.
    ///
    /// JSON `null` is how the server renders `void`, it becomes an empty string.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::String(String::new()),
            serde_json::Value::Bool(v) => Self::Bool(v),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Self::Int(v)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(vs) => Self::List(vs.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(m) => Self::Map(
                m.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Renders the wire value as JSON
    pub fn to_json(&self) -> Result<serde_json::Value, EncodeError> {
        match self {
            Self::Int(v) => Ok((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .ok_or(EncodeError::non_finite(*v)),
            Self::Bool(v) => Ok((*v).into()),
            Self::String(v) => Ok(v.as_str().into()),
            Self::DateTime(v) => Ok(format_datetime(v).into()),
            Self::List(vs) => vs
                .iter()
                .enumerate()
                .map(|(i, v)| v.to_json().map_err(|err| err.within(format!("[{i}]"))))
                .collect::<Result<_, _>>()
                .map(serde_json::Value::Array),
            Self::Map(m) => m
                .iter()
                .map(|(k, v)| {
                    v.to_json()
                        .map(|v| (k.clone(), v))
                        .map_err(|err| err.within(k))
                })
                .collect::<Result<_, _>>()
                .map(serde_json::Value::Object),
        }
    }
}

/// Formats a datetime the way the control plane does
pub fn format_datetime(v: &DateTime<Utc>) -> String {
    v.format(DATETIME_FORMAT).to_string()
}

/// Parses any of the datetime renderings the control plane is known to emit
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    for fmt in [DATETIME_FORMAT, "%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&v));
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|v| v.with_timezone(&Utc))
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}
