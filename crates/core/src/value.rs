//! Typed entity property values
//!
//! An entity's property bag is a map of name → [`PropertyValue`]. The
//! variants mirror the Table service's EDM types so a value keeps its wire
//! type through a round trip:
//!
//! | Variant | EDM type |
//! |---|---|
//! | `String` | `Edm.String` |
//! | `Int32` | `Edm.Int32` |
//! | `Int64` | `Edm.Int64` |
//! | `Double` | `Edm.Double` |
//! | `Bool` | `Edm.Boolean` |
//! | `DateTime` | `Edm.DateTime` |
//! | `Binary` | `Edm.Binary` |
//! | `Guid` | `Edm.Guid` |
//!
//! Different variants never compare equal: `Int32(1) != Int64(1)`.
//! `Double` follows IEEE-754 equality: `NaN != NaN`.
//!
//! `DateTime` carries 100ns ticks, the service's resolution. Converting a
//! `DateTime<Utc>` truncates to a whole tick; entity validation rejects a
//! finer value built through the variant directly.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fractional-second digits of a 100ns tick
pub const TICK_DIGITS: u16 = 7;

/// Property name → value, ordered by name
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A single typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// UTF-8 string
    String(String),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point (IEEE-754)
    Double(f64),
    /// Boolean
    Bool(bool),
    /// UTC timestamp
    DateTime(DateTime<Utc>),
    /// Raw bytes
    Binary(Vec<u8>),
    /// 128-bit GUID
    Guid(Uuid),
}

impl PropertyValue {
    /// EDM type name used in OData annotations
    pub fn edm_type(&self) -> &'static str {
        match self {
            PropertyValue::String(_) => "Edm.String",
            PropertyValue::Int32(_) => "Edm.Int32",
            PropertyValue::Int64(_) => "Edm.Int64",
            PropertyValue::Double(_) => "Edm.Double",
            PropertyValue::Bool(_) => "Edm.Boolean",
            PropertyValue::DateTime(_) => "Edm.DateTime",
            PropertyValue::Binary(_) => "Edm.Binary",
            PropertyValue::Guid(_) => "Edm.Guid",
        }
    }

    /// Size of the value as counted by the Table service entity-size formula
    ///
    /// Strings count two bytes per UTF-16 unit plus a 4-byte length prefix;
    /// binary counts its length plus the same prefix.
    pub fn encoded_size(&self) -> usize {
        match self {
            PropertyValue::String(s) => 4 + 2 * s.encode_utf16().count(),
            PropertyValue::Binary(b) => 4 + b.len(),
            PropertyValue::Int32(_) => 4,
            PropertyValue::Int64(_) | PropertyValue::Double(_) | PropertyValue::DateTime(_) => 8,
            PropertyValue::Bool(_) => 1,
            PropertyValue::Guid(_) => 16,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if this is an integer value of either width
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int32(i) => Some(i64::from(*i)),
            PropertyValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Double value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Binary value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Binary(b) => Some(b),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Int32(i)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int64(i)
    }
}

impl From<f64> for PropertyValue {
    fn from(d: f64) -> Self {
        PropertyValue::Double(d)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(t: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(t.trunc_subsecs(TICK_DIGITS))
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(b: Vec<u8>) -> Self {
        PropertyValue::Binary(b)
    }
}

impl From<Uuid> for PropertyValue {
    fn from(g: Uuid) -> Self {
        PropertyValue::Guid(g)
    }
}

/// Build a [`PropertyMap`] from `(name, value)` pairs
pub fn properties<I, K, V>(pairs: I) -> PropertyMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
