//! Identifier and token types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Accepts either a JSON string or a JSON integer.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<TextOrNumber> for String {
    fn from(value: TextOrNumber) -> Self {
        match value {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Signed(n) => n.to_string(),
            TextOrNumber::Unsigned(n) => n.to_string(),
        }
    }
}

/// The `id` of a record.
///
/// Record ids are compared and ordered as text. Numeric ids received from a
/// server are converted to their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extracts a record id from a JSON value.
    ///
    /// Only non-empty strings and integers are valid ids.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        TextOrNumber::deserialize(deserializer).map(|v| Self(v.into()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque token the server issues to a client on its first round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Creates a client identity.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ClientIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        TextOrNumber::deserialize(deserializer).map(|v| Self(v.into()))
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// The point up to which a client has received server changes.
///
/// Supplied by the server in upload acknowledgments; only ever increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(pub u64);

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A revision marker in the poll protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_from_value() {
        assert_eq!(RecordId::from_value(&json!("abc")), Some(RecordId::from("abc")));
        assert_eq!(RecordId::from_value(&json!(42)), Some(RecordId::from("42")));
        assert_eq!(RecordId::from_value(&json!("")), None);
        assert_eq!(RecordId::from_value(&json!(1.5)), None);
        assert_eq!(RecordId::from_value(&json!([1])), None);
        assert_eq!(RecordId::from_value(&json!(null)), None);
    }

    #[test]
    fn numeric_ids_deserialize_as_text() {
        let id: RecordId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(id.as_str(), "7");

        let identity: ClientIdentity = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(identity, ClientIdentity::from("1"));
    }

    #[test]
    fn watermark_is_transparent() {
        let mark: Watermark = serde_json::from_value(json!(1_700_000_000_000u64)).unwrap();
        assert_eq!(mark, Watermark(1_700_000_000_000));
        assert_eq!(serde_json::to_value(mark).unwrap(), json!(1_700_000_000_000u64));
    }
}
