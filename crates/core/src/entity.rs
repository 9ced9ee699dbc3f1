//! Entities, keys and ETags

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::{PropertyMap, PropertyValue};

/// `(PartitionKey, RowKey)` identity of an entity within a table
///
/// Ordering is partition first, then row, which is also the table's
/// iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Partition key
    pub partition_key: String,
    /// Row key
    pub row_key: String,
}

impl EntityKey {
    /// Create a key
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        EntityKey {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.row_key)
    }
}

/// Opaque entity version token
///
/// Minted by the store on every write using the Table service's weak
/// datetime form, `W/"datetime'2024-01-01T00:00:00.0000000Z'"`. Callers must
/// treat the contents as opaque and only compare for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    /// Wrap an ETag string received from a client
    pub fn new(raw: impl Into<String>) -> Self {
        ETag(raw.into())
    }

    /// Mint an ETag for a write stamped at `timestamp`
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        ETag(format!("W/\"datetime'{}'\"", format_timestamp(&timestamp)))
    }

    /// The raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RFC 3339 with the seven fractional digits the Table service emits
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // chrono offers 3/6/9 digits; trim nanos to 100ns ticks
    let nanos = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    match nanos.len() {
        n if n >= 3 => format!("{}Z", &nanos[..n - 3]),
        _ => nanos,
    }
}

/// Expected-version precondition on update and delete
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IfMatch {
    /// Wildcard `*`: any stored version matches
    #[default]
    Any,
    /// Stored ETag must equal this one
    ETag(ETag),
}

impl IfMatch {
    /// Parse an `If-Match` header value
    pub fn parse(header: &str) -> Self {
        match header.trim() {
            "*" => IfMatch::Any,
            tag => IfMatch::ETag(ETag::new(tag)),
        }
    }

    /// Whether a stored ETag satisfies this precondition
    pub fn matches(&self, stored: &ETag) -> bool {
        match self {
            IfMatch::Any => true,
            IfMatch::ETag(expected) => expected == stored,
        }
    }
}

/// A stored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity
    pub key: EntityKey,
    /// User properties (system properties excluded)
    pub properties: PropertyMap,
    /// Current version token
    pub etag: ETag,
    /// Last-modified time
    pub timestamp: DateTime<Utc>,
}

impl Entity {
    /// Look up a property by name
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Partition key
    pub fn partition_key(&self) -> &str {
        &self.key.partition_key
    }

    /// Row key
    pub fn row_key(&self) -> &str {
        &self.key.row_key
    }
}
