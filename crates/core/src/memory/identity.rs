//! Content addressing for stored objects
//!
//! An [`ObjectId`] is the lowercase hex SHA-256 of an object's canonical
//! encoding. It depends on content only, never on allocation-time state, so
//! identical content always maps to the same id and deduplicates.
//!
//! Sizing is a caller contract: an [`Object`] always carries an explicit
//! byte length, either the length of its encoding or a size supplied with
//! [`Object::with_identity`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{AllocatorError, AllocatorResult};

/// Canonical identifier format: SHA-256 as 64 lowercase hex characters
const CANONICAL_ID_PATTERN: &str = r"^[a-f0-9]{64}$";

static CANONICAL_ID: OnceLock<Option<Regex>> = OnceLock::new();

fn is_canonical(candidate: &str) -> bool {
    CANONICAL_ID
        .get_or_init(|| Regex::new(CANONICAL_ID_PATTERN).ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(candidate))
}

/// Content-derived stable object identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Hash raw content
    #[must_use]
    pub fn from_content(content: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(content)))
    }

    /// Resolve a caller-supplied identifier
    ///
    /// A string already in canonical format is accepted unchanged; anything
    /// else is treated as JSON string content and hashed, so
    /// `from_identifier("abc")` equals the id of `Object::from_json(&"abc")`.
    #[must_use]
    pub fn from_identifier(identifier: &str) -> Self {
        if is_canonical(identifier) {
            return Self(identifier.to_owned());
        }
        let encoded = Value::String(identifier.to_owned()).to_string();
        Self::from_content(encoded.as_bytes())
    }

    /// Parse a canonical identifier, rejecting anything else
    ///
    /// # Errors
    ///
    /// Returns a validation error if `candidate` is not 64 lowercase hex characters.
    pub fn parse(candidate: &str) -> AllocatorResult<Self> {
        if is_canonical(candidate) {
            Ok(Self(candidate.to_owned()))
        } else {
            Err(AllocatorError::validation(
                "object_id",
                format!("'{candidate}' is not a 64 character lowercase hex SHA-256"),
            ))
        }
    }

    /// Identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ObjectId {
    type Error = AllocatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_canonical(&value) {
            Ok(Self(value))
        } else {
            Err(AllocatorError::validation(
                "object_id",
                format!("'{value}' is not a canonical object id"),
            ))
        }
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Rebuild every JSON object with its keys inserted in sorted order
///
/// Holds whether or not `serde_json`'s map keeps insertion order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// An object handed to the allocator: identity, byte length and opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    id: ObjectId,
    size: u64,
    payload: Vec<u8>,
}

impl Object {
    /// Object whose content and size are the given bytes
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let payload = bytes.into();
        Self {
            id: ObjectId::from_content(&payload),
            size: payload.len() as u64,
            payload,
        }
    }

    /// Object encoded as canonical JSON (object keys sorted)
    ///
    /// # Errors
    ///
    /// Returns error if `value` cannot be serialized.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> AllocatorResult<Self> {
        let canonical = canonicalize(serde_json::to_value(value)?);
        let payload = serde_json::to_vec(&canonical)?;
        Ok(Self::from_bytes(payload))
    }

    /// Object with a caller-supplied identity and explicit byte length
    #[must_use]
    pub fn with_identity(identifier: &str, size: u64, payload: Vec<u8>) -> Self {
        Self {
            id: ObjectId::from_identifier(identifier),
            size,
            payload,
        }
    }

    /// Content identifier
    #[must_use]
    pub const fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Byte length to allocate
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Opaque payload handed to the store
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume into the payload bytes
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_identical_content_same_id() {
        let a = Object::from_bytes(b"Test Object 1".to_vec());
        let b = Object::from_bytes(b"Test Object 1".to_vec());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.size(), 13);
    }

    #[test]
    fn test_json_key_order_does_not_matter() -> AllocatorResult<()> {
        let mut first = HashMap::new();
        first.insert("key", serde_json::json!("value"));
        first.insert("number", serde_json::json!(42));
        let second = serde_json::json!({"number": 42, "key": "value"});

        let a = Object::from_json(&first)?;
        let b = Object::from_json(&second)?;
        assert_eq!(a.id(), b.id());
        assert_eq!(a.payload(), br#"{"key":"value","number":42}"#);
        Ok(())
    }

    #[test]
    fn test_nested_keys_sorted_regardless_of_field_order() -> AllocatorResult<()> {
        #[derive(Serialize)]
        struct Inner {
            y: u8,
            x: u8,
        }

        #[derive(Serialize)]
        struct Outer {
            zeta: u8,
            items: Vec<Inner>,
            alpha: Inner,
        }

        let object = Object::from_json(&Outer {
            zeta: 0,
            items: vec![Inner { y: 3, x: 4 }],
            alpha: Inner { y: 1, x: 2 },
        })?;
        assert_eq!(
            object.payload(),
            br#"{"alpha":{"x":2,"y":1},"items":[{"x":4,"y":3}],"zeta":0}"#
        );
        Ok(())
    }

    #[test]
    fn test_canonical_identifier_accepted_unchanged() {
        let hashed = ObjectId::from_content(b"abc");
        let resolved = ObjectId::from_identifier(hashed.as_str());
        assert_eq!(resolved, hashed);
    }

    #[test]
    fn test_plain_identifier_hashed_as_json_string() -> AllocatorResult<()> {
        let resolved = ObjectId::from_identifier("abc");
        let object = Object::from_json("abc")?;
        assert_eq!(&resolved, object.id());
        // SHA-256 of the quoted string `"abc"`.
        assert_eq!(
            resolved.as_str(),
            "6cc43f858fbb763301637b5af970e2a46b46f461f27e5a0f41e009c59b827b25"
        );
        Ok(())
    }

    #[test]
    fn test_uppercase_hex_is_not_canonical() {
        let upper = ObjectId::from_content(b"abc").as_str().to_uppercase();
        assert!(ObjectId::parse(&upper).is_err());
        assert_ne!(ObjectId::from_identifier(&upper).as_str(), upper);
    }

    #[test]
    fn test_with_identity_keeps_explicit_size() {
        let object = Object::with_identity("session-42", 1_234, Vec::new());
        assert_eq!(object.size(), 1_234);
        assert_eq!(object.id(), &ObjectId::from_identifier("session-42"));
    }

    #[test]
    fn test_object_id_serde_rejects_non_canonical() {
        let result: Result<ObjectId, _> = serde_json::from_str("\"not-a-hash\"");
        assert!(result.is_err());
    }
}
