//! Translation dictionary type.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing a dictionary payload.
#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("Failed to parse dictionary JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dictionary payload must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("Translation for '{key}' must be a string, found {found}")]
    NonStringValue { key: String, found: &'static str },
}

/// Passage key → translated text.
///
/// A missing key means "no translation available".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationDictionary {
    /// key → translation
    entries: HashMap<String, String>,
}

impl TranslationDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a serialized mapping.
    ///
    /// The whole payload is rejected if any value is not a string, so a
    /// partially valid payload is never adopted.
    ///
    /// # Errors
    /// Invalid JSON, a non-object root or a non-string value.
    pub fn parse(payload: &str) -> Result<Self, DictionaryError> {
        Self::from_value(serde_json::from_str(payload)?)
    }

    /// # Errors
    /// See [`TranslationDictionary::parse`].
    pub fn parse_bytes(payload: &[u8]) -> Result<Self, DictionaryError> {
        Self::from_value(serde_json::from_slice(payload)?)
    }

    /// Checks every value before building the dictionary.
    fn from_value(value: Value) -> Result<Self, DictionaryError> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(DictionaryError::NotAnObject(json_kind(&other))),
        };

        let mut entries = HashMap::with_capacity(map.len());
        for (key, value) in map {
            match value {
                Value::String(text) => {
                    entries.insert(key, text);
                }
                other => {
                    return Err(DictionaryError::NonStringValue { key, found: json_kind(&other) });
                }
            }
        }

        Ok(Self { entries })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes the mapping back into a JSON object with sorted keys.
    ///
    /// `indent` is the number of spaces per level; `0` produces compact output.
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self, indent: usize) -> Result<String, serde_json::Error> {
        let sorted: std::collections::BTreeMap<_, _> = self.entries.iter().collect();
        if indent == 0 {
            return serde_json::to_string(&sorted);
        }

        let indent = " ".repeat(indent);
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        sorted.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

impl<K, V> FromIterator<(K, V)> for TranslationDictionary
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Name of the JSON type, for error messages.
const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
