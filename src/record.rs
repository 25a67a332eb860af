use crate::field::Field;
use crate::level::Level;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// One rendered log event, as handed to writers and sinks.
///
/// Fields keep their insertion order and duplicates are kept; the JSON
/// form writes `level`, `time`, every field in order, then `message`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub fields: Vec<(String, Value)>,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: Level) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            fields: Vec::new(),
            message: String::new(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((key.into(), value.into()));
    }

    /// Append a typed field through its JSON rendering.
    pub fn push_field(&mut self, field: &Field) {
        self.fields.push((field.key().to_string(), field.value().to_json()));
    }

    /// Last value stored under `key`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Every value stored under `key`, in emission order.
    pub fn fields_named<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn time_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Single-line JSON rendering, without a trailing newline.
    pub fn to_json_line(&self) -> String {
        // Keys are strings and values are already JSON, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        map.serialize_entry("level", self.level.as_str())?;
        map.serialize_entry("time", &self.time_string())?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("message", &self.message)?;
        map.end()
    }
}
