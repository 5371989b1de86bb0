//! Keyspace Object Model
//!
//! Every key maps to an [`Object`]: a typed value plus an absolute
//! expiration deadline. The value payload is a closed union over the
//! supported types, so a mismatched type/payload combination cannot be
//! represented.
//!
//! ## String Encoding
//!
//! String values come in two encodings. A value that parses losslessly as a
//! signed 64-bit decimal integer is stored as [`Value::Int`]; anything else
//! is stored as [`Value::Raw`]. The distinction affects representation only:
//! both render back to their decimal/raw text form on read, and INCR always
//! leaves a key in the integer encoding.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::storage::list::List;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The type tag of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    String,
    List,
    Set,
}

impl ObjectType {
    /// The tag string reported by the TYPE command.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::String => "string",
            ObjectType::List => "list",
            ObjectType::Set => "set",
        }
    }
}

/// A stored value: the payload and its type in one tagged union.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value in raw (text) encoding
    Raw(String),
    /// String value in integer encoding
    Int(i64),
    /// Ordered sequence of strings
    List(List),
    /// Unordered collection of unique strings
    Set(HashSet<String>),
}

impl Value {
    /// Encodes a string payload, picking the integer encoding when the text
    /// is exactly a signed 64-bit decimal.
    pub fn from_string(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(n) if n.to_string() == s => Value::Int(n),
            _ => Value::Raw(s.to_string()),
        }
    }
}

/// A keyspace object: one key's value and expiration deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    /// The typed payload
    pub value: Value,
    /// Absolute deadline in milliseconds since the epoch; 0 = no expiration
    pub expires_at: u64,
}

impl Object {
    /// Creates an object with no expiration.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: 0,
        }
    }

    /// Returns the object's type tag.
    pub fn object_type(&self) -> ObjectType {
        match self.value {
            Value::Raw(_) | Value::Int(_) => ObjectType::String,
            Value::List(_) => ObjectType::List,
            Value::Set(_) => ObjectType::Set,
        }
    }

    /// Checks whether the object is past its deadline at `now`.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }

    /// Renders a string-typed payload back to text. None for lists/sets.
    pub fn render_string(&self) -> Option<String> {
        match &self.value {
            Value::Raw(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The list payload, if this is a list object.
    pub fn as_list(&self) -> Option<&List> {
        match &self.value {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Mutable access to the list payload.
    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match &mut self.value {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// The set payload, if this is a set object.
    pub fn as_set(&self) -> Option<&HashSet<String>> {
        match &self.value {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Mutable access to the set payload.
    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<String>> {
        match &mut self.value {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding() {
        assert_eq!(Value::from_string("42"), Value::Int(42));
        assert_eq!(Value::from_string("-7"), Value::Int(-7));
        assert_eq!(Value::from_string("0"), Value::Int(0));
    }

    #[test]
    fn test_raw_encoding() {
        assert_eq!(Value::from_string("hello"), Value::Raw("hello".into()));
        // Not a lossless round trip: leading zero / plus sign stay raw
        assert_eq!(Value::from_string("007"), Value::Raw("007".into()));
        assert_eq!(Value::from_string("+1"), Value::Raw("+1".into()));
        assert_eq!(Value::from_string("1.5"), Value::Raw("1.5".into()));
        // Overflows i64
        assert_eq!(
            Value::from_string("99999999999999999999"),
            Value::Raw("99999999999999999999".into())
        );
    }

    #[test]
    fn test_render_round_trip() {
        let int_obj = Object::new(Value::from_string("1234"));
        assert_eq!(int_obj.render_string(), Some("1234".to_string()));

        let raw_obj = Object::new(Value::from_string("hello"));
        assert_eq!(raw_obj.render_string(), Some("hello".to_string()));
    }

    #[test]
    fn test_object_type_tags() {
        assert_eq!(
            Object::new(Value::Raw("x".into())).object_type(),
            ObjectType::String
        );
        assert_eq!(
            Object::new(Value::Int(1)).object_type(),
            ObjectType::String
        );
        assert_eq!(
            Object::new(Value::List(List::new())).object_type(),
            ObjectType::List
        );
        assert_eq!(
            Object::new(Value::Set(HashSet::new())).object_type(),
            ObjectType::Set
        );
        assert_eq!(ObjectType::List.as_str(), "list");
    }

    #[test]
    fn test_expiration() {
        let mut obj = Object::new(Value::Int(1));
        assert!(!obj.is_expired(now_ms()));

        obj.expires_at = now_ms() - 1;
        assert!(obj.is_expired(now_ms()));

        // Zero always means "never expires"
        obj.expires_at = 0;
        assert!(!obj.is_expired(u64::MAX));
    }
}
