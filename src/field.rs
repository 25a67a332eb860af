use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

/// One typed key/value datum attached to a log record.
///
/// Fields are immutable once built. A log call takes them as an ordered
/// slice; the order is kept in the rendered record and duplicate keys are
/// not collapsed. Empty keys are accepted as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    key: String,
    value: FieldValue,
}

/// Closed set of value kinds a [`Field`] can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    Time(DateTime<Utc>),
    Duration(Duration),
    /// Rendered error text, including its `source()` chain.
    Error(String),
    /// Pre-encoded JSON, emitted without re-serialization.
    RawJson(Vec<u8>),
    Dict(Vec<Field>),
    Array(Vec<Field>),
    /// Opaque value for anything outside the kinds above.
    Any(Value),
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Field { key: key.into(), value: value.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, FieldValue::Str(value.into()))
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self::new(key, value)
    }

    pub fn int(key: impl Into<String>, value: isize) -> Self {
        Self::new(key, value)
    }

    pub fn int8(key: impl Into<String>, value: i8) -> Self {
        Self::new(key, value)
    }

    pub fn int16(key: impl Into<String>, value: i16) -> Self {
        Self::new(key, value)
    }

    pub fn int32(key: impl Into<String>, value: i32) -> Self {
        Self::new(key, value)
    }

    pub fn int64(key: impl Into<String>, value: i64) -> Self {
        Self::new(key, value)
    }

    pub fn uint(key: impl Into<String>, value: usize) -> Self {
        Self::new(key, value)
    }

    pub fn uint8(key: impl Into<String>, value: u8) -> Self {
        Self::new(key, value)
    }

    pub fn uint16(key: impl Into<String>, value: u16) -> Self {
        Self::new(key, value)
    }

    pub fn uint32(key: impl Into<String>, value: u32) -> Self {
        Self::new(key, value)
    }

    pub fn uint64(key: impl Into<String>, value: u64) -> Self {
        Self::new(key, value)
    }

    pub fn float32(key: impl Into<String>, value: f32) -> Self {
        Self::new(key, value)
    }

    pub fn float64(key: impl Into<String>, value: f64) -> Self {
        Self::new(key, value)
    }

    pub fn time(key: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::new(key, value)
    }

    pub fn duration(key: impl Into<String>, value: Duration) -> Self {
        Self::new(key, value)
    }

    /// Error field under the conventional `"error"` key.
    pub fn error(err: &dyn Error) -> Self {
        Self::named_error("error", err)
    }

    pub fn named_error(key: impl Into<String>, err: &dyn Error) -> Self {
        Self::new(key, FieldValue::Error(error_chain(err)))
    }

    /// Opaque field. Serializes `value` with serde; if that fails the
    /// `Debug` rendering is kept instead, so the field is never lost.
    pub fn any<T: Serialize + Debug + ?Sized>(key: impl Into<String>, value: &T) -> Self {
        let rendered = serde_json::to_value(value).unwrap_or_else(|_| Value::String(format!("{value:?}")));
        Self::new(key, FieldValue::Any(rendered))
    }

    /// Same as [`Field::any`].
    pub fn interface<T: Serialize + Debug + ?Sized>(key: impl Into<String>, value: &T) -> Self {
        Self::any(key, value)
    }

    /// Opaque field rendered from the value's `Debug` output.
    pub fn debug<T: Debug + ?Sized>(key: impl Into<String>, value: &T) -> Self {
        Self::new(key, FieldValue::Any(Value::String(format!("{value:?}"))))
    }

    pub fn raw_json(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(key, FieldValue::RawJson(bytes.into()))
    }

    /// Nested object built from `fields`.
    pub fn dict(key: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Self {
        Self::new(key, FieldValue::Dict(fields.into_iter().collect()))
    }

    /// Sequence of the values of `fields`; their keys are ignored.
    pub fn array(key: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Self {
        Self::new(key, FieldValue::Array(fields.into_iter().collect()))
    }
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Str(_) => "string",
            FieldValue::Bool(_) => "bool",
            FieldValue::I8(_) => "int8",
            FieldValue::I16(_) => "int16",
            FieldValue::I32(_) => "int32",
            FieldValue::I64(_) => "int64",
            FieldValue::Isize(_) => "int",
            FieldValue::U8(_) => "uint8",
            FieldValue::U16(_) => "uint16",
            FieldValue::U32(_) => "uint32",
            FieldValue::U64(_) => "uint64",
            FieldValue::Usize(_) => "uint",
            FieldValue::F32(_) => "float32",
            FieldValue::F64(_) => "float64",
            FieldValue::Time(_) => "time",
            FieldValue::Duration(_) => "duration",
            FieldValue::Error(_) => "error",
            FieldValue::RawJson(_) => "raw_json",
            FieldValue::Dict(_) => "dict",
            FieldValue::Array(_) => "array",
            FieldValue::Any(_) => "any",
        }
    }

    /// Render the value as JSON. Every kind has a rendering; nothing here
    /// can fail.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Str(v) => Value::String(v.clone()),
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::I8(v) => Value::from(*v),
            FieldValue::I16(v) => Value::from(*v),
            FieldValue::I32(v) => Value::from(*v),
            FieldValue::I64(v) => Value::from(*v),
            FieldValue::Isize(v) => Value::from(*v as i64),
            FieldValue::U8(v) => Value::from(*v),
            FieldValue::U16(v) => Value::from(*v),
            FieldValue::U32(v) => Value::from(*v),
            FieldValue::U64(v) => Value::from(*v),
            FieldValue::Usize(v) => Value::from(*v as u64),
            FieldValue::F32(v) => float(f64::from(*v)),
            FieldValue::F64(v) => float(*v),
            FieldValue::Time(v) => Value::String(v.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            FieldValue::Duration(v) => float(v.as_nanos() as f64 / 1_000_000.0),
            FieldValue::Error(v) => Value::String(v.clone()),
            FieldValue::RawJson(bytes) => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
            FieldValue::Dict(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for field in fields {
                    map.insert(field.key.clone(), field.value.to_json());
                }
                Value::Object(map)
            }
            FieldValue::Array(fields) => Value::Array(fields.iter().map(|f| f.value.to_json()).collect()),
            FieldValue::Any(v) => v.clone(),
        }
    }
}

fn float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v.is_sign_positive() => Value::String("+Inf".to_string()),
        None => Value::String("-Inf".to_string()),
    }
}

/// `err` followed by each of its sources, joined with `": "`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    String => Str,
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    DateTime<Utc> => Time,
    Duration => Duration,
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}
