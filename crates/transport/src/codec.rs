use core::fmt;
use core::hash::{BuildHasher, Hash};

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::value::parse_datetime;
use crate::{Kind, Value};

fn render_path(f: &mut fmt::Formatter<'_>, path: &[String]) -> fmt::Result {
    let mut segments = path.iter();
    if let Some(first) = segments.next() {
        f.write_str(first)?;
        for seg in segments {
            write!(f, " -> {seg}")?;
        }
        f.write_str(": ")?;
    }
    Ok(())
}

/// Reason a typed value could not be turned into a [`Value`]
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EncodeErrorKind {
    #[error("{0} is not a finite number")]
    NonFinite(f64),
    #[error("{0} does not fit into a wire integer")]
    OutOfRange(u64),
    #[error("map key must encode to a string, got {0}")]
    NonStringKey(Kind),
}

/// Local encoding failure, raised before any I/O happens
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeError {
    path: Vec<String>,
    kind: EncodeErrorKind,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }

    pub fn non_finite(v: f64) -> Self {
        Self::new(EncodeErrorKind::NonFinite(v))
    }

    /// Prepends `segment` to the error path
    #[must_use]
    pub fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn kind(&self) -> &EncodeErrorKind {
        &self.kind
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_path(f, &self.path)?;
        self.kind.fmt(f)
    }
}

impl std::error::Error for EncodeError {}

/// Reason a [`Value`] does not match the expected shape
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("expected {expected}, got {got}")]
    Mismatch { expected: &'static str, got: Kind },
    #[error("{value} is out of range for {expected}")]
    OutOfRange { expected: &'static str, value: String },
    #[error("malformed value: {0}")]
    Malformed(String),
}

/// Decoding failure, annotated with the path at which the mismatch occurred.
///
/// Renders as `VM.get_record -> snapshot_time: expected datetime, got string`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodeError {
    path: Vec<String>,
    kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind) -> Self {
        Self {
            path: Vec::new(),
            kind,
        }
    }

    pub fn mismatch(expected: &'static str, got: &Value) -> Self {
        Self::new(DecodeErrorKind::Mismatch {
            expected,
            got: got.kind(),
        })
    }

    /// Prepends `segment` to the error path
    #[must_use]
    pub fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn kind(&self) -> &DecodeErrorKind {
        &self.kind
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_path(f, &self.path)?;
        self.kind.fmt(f)
    }
}

impl std::error::Error for DecodeError {}

/// Types which can be represented as a [`Value`]
pub trait Encode {
    fn encode(&self) -> Result<Value, EncodeError>;
}

/// Types which can be recovered from a [`Value`]
pub trait Decode: Sized {
    fn decode(value: Value) -> Result<Self, DecodeError>;
}

/// Ordered positional call arguments
pub trait Params {
    fn encode_params(&self) -> Result<Vec<Value>, EncodeError>;
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Result<Value, EncodeError> {
        (**self).encode()
    }
}

impl Encode for Value {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(self.clone())
    }
}

impl Decode for Value {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

/// `void` results, the value is discarded
impl Decode for () {
    fn decode(_: Value) -> Result<Self, DecodeError> {
        Ok(())
    }
}

impl Encode for bool {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Bool(*self))
    }
}

impl Decode for bool {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Bool(v) => Ok(v),
            v => Err(DecodeError::mismatch("bool", &v)),
        }
    }
}

impl Encode for i64 {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::Int(*self))
    }
}

impl Decode for i64 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Int(v) => Ok(v),
            v => Err(DecodeError::mismatch("int", &v)),
        }
    }
}

impl Encode for u64 {
    fn encode(&self) -> Result<Value, EncodeError> {
        i64::try_from(*self)
            .map(Value::Int)
            .map_err(|_| EncodeError::new(EncodeErrorKind::OutOfRange(*self)))
    }
}

impl Decode for u64 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let v = i64::decode(value)?;
        u64::try_from(v).map_err(|_| {
            DecodeError::new(DecodeErrorKind::OutOfRange {
                expected: "unsigned int",
                value: v.to_string(),
            })
        })
    }
}

impl Encode for f64 {
    fn encode(&self) -> Result<Value, EncodeError> {
        if self.is_finite() {
            Ok(Value::Float(*self))
        } else {
            Err(EncodeError::non_finite(*self))
        }
    }
}

impl Decode for f64 {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Float(v) => Ok(v),
            // JSON does not distinguish `1.0` from `1`
            #[allow(clippy::cast_precision_loss)]
            Value::Int(v) => Ok(v as f64),
            v => Err(DecodeError::mismatch("float", &v)),
        }
    }
}

impl Encode for str {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::String(self.to_string()))
    }
}

impl Encode for String {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::String(self.clone()))
    }
}

impl Decode for String {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(v) => Ok(v),
            v => Err(DecodeError::mismatch("string", &v)),
        }
    }
}

impl Encode for DateTime<Utc> {
    fn encode(&self) -> Result<Value, EncodeError> {
        Ok(Value::DateTime(*self))
    }
}

impl Decode for DateTime<Utc> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::String(ref s) => {
                parse_datetime(s).ok_or_else(|| DecodeError::mismatch("datetime", &value))
            }
            v => Err(DecodeError::mismatch("datetime", &v)),
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self) -> Result<Value, EncodeError> {
        self.iter()
            .enumerate()
            .map(|(i, v)| v.encode().map_err(|err| err.within(format!("[{i}]"))))
            .collect::<Result<_, _>>()
            .map(Value::List)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self) -> Result<Value, EncodeError> {
        self.as_slice().encode()
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::List(vs) => vs
                .into_iter()
                .enumerate()
                .map(|(i, v)| T::decode(v).map_err(|err| err.within(format!("[{i}]"))))
                .collect(),
            v => Err(DecodeError::mismatch("list", &v)),
        }
    }
}

/// Decodes `value` if present. Absence is expressed by the caller, e.g. a
/// record field missing from the wire map.
impl<T: Decode> Decode for Option<T> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        T::decode(value).map(Some)
    }
}

fn encode_key(key: &impl Encode) -> Result<String, EncodeError> {
    match key.encode()? {
        Value::String(s) => Ok(s),
        v => Err(EncodeError::new(EncodeErrorKind::NonStringKey(v.kind()))),
    }
}

fn encode_entries<'a, K, V>(
    entries: impl IntoIterator<Item = (&'a K, &'a V)>,
) -> Result<Value, EncodeError>
where
    K: Encode + 'a,
    V: Encode + 'a,
{
    let mut m = BTreeMap::new();
    for (k, v) in entries {
        let k = encode_key(k)?;
        let v = v.encode().map_err(|err| err.within(k.as_str()))?;
        m.insert(k, v);
    }
    Ok(Value::Map(m))
}

fn decode_entries<K, V, C>(value: Value) -> Result<C, DecodeError>
where
    K: Decode,
    V: Decode,
    C: FromIterator<(K, V)>,
{
    match value {
        Value::Map(m) => m
            .into_iter()
            .map(|(k, v)| -> Result<(K, V), DecodeError> {
                let v = V::decode(v).map_err(|err| err.within(k.as_str()))?;
                let key = k.clone();
                let k = K::decode(Value::String(k)).map_err(|err| err.within(key))?;
                Ok((k, v))
            })
            .collect(),
        v => Err(DecodeError::mismatch("map", &v)),
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self) -> Result<Value, EncodeError> {
        encode_entries(self)
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        decode_entries(value)
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode(&self) -> Result<Value, EncodeError> {
        encode_entries(self)
    }
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash,
    V: Decode,
    S: BuildHasher + Default,
{
    fn decode(value: Value) -> Result<Self, DecodeError> {
        decode_entries(value)
    }
}

/// Unwraps a wire map, used by record decoders
pub fn expect_map(value: Value) -> Result<BTreeMap<String, Value>, DecodeError> {
    match value {
        Value::Map(m) => Ok(m),
        v => Err(DecodeError::mismatch("map", &v)),
    }
}

/// Removes and decodes record field `name`, yielding the zero value if absent
pub fn take_field<T: Decode + Default>(
    map: &mut BTreeMap<String, Value>,
    name: &str,
) -> Result<T, DecodeError> {
    map.remove(name)
        .map_or_else(|| Ok(T::default()), T::decode)
        .map_err(|err| err.within(name))
}

impl Params for () {
    fn encode_params(&self) -> Result<Vec<Value>, EncodeError> {
        Ok(Vec::new())
    }
}

impl Params for Vec<Value> {
    fn encode_params(&self) -> Result<Vec<Value>, EncodeError> {
        Ok(self.clone())
    }
}

macro_rules! impl_params {
    ($($i:tt $t:ident),+) => {
        impl<$($t: Encode),+> Params for ($($t,)+) {
            fn encode_params(&self) -> Result<Vec<Value>, EncodeError> {
                Ok(vec![$(
                    self.$i
                        .encode()
                        .map_err(|err| err.within(concat!("#", stringify!($i))))?
                ),+])
            }
        }
    };
}

impl_params!(0 A);
impl_params!(0 A, 1 B);
impl_params!(0 A, 1 B, 2 C);
impl_params!(0 A, 1 B, 2 C, 3 D);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
