//! Size and shape limits for batches and entities
//!
//! Every limit here is configurable. The defaults follow the Table service's
//! published contract; callers override them through the engine config.
//! Violations surface as `InvalidEntity` (payload) or `TooManyOperations`
//! (change-set size) rejections.

use thiserror::Error;

use crate::entity::EntityKey;
use crate::value::PropertyMap;

/// Property names the service owns
pub const SYSTEM_PROPERTIES: [&str; 3] = ["PartitionKey", "RowKey", "Timestamp"];

/// Maximum property name length in characters
pub const MAX_PROPERTY_NAME_CHARS: usize = 255;

/// Batch and entity limits
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum operations per change-set (default: 100)
    pub max_operations_per_changeset: usize,

    /// Maximum PartitionKey / RowKey length in bytes (default: 1024)
    pub max_key_bytes: usize,

    /// Maximum user properties per entity (default: 252)
    pub max_properties: usize,

    /// Maximum string property size in bytes (default: 64KB)
    pub max_string_bytes: usize,

    /// Maximum binary property size in bytes (default: 64KB)
    pub max_binary_bytes: usize,

    /// Maximum entity size per the service sizing formula (default: 1MB)
    pub max_entity_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_operations_per_changeset: 100,
            max_key_bytes: 1024,
            max_properties: 252,
            max_string_bytes: 64 * 1024,
            max_binary_bytes: 64 * 1024,
            max_entity_bytes: 1024 * 1024,
        }
    }
}

/// Which half of the entity key a violation concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPart {
    /// PartitionKey
    Partition,
    /// RowKey
    Row,
}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Partition => f.write_str("PartitionKey"),
            KeyPart::Row => f.write_str("RowKey"),
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_operations_per_changeset: 5,
            max_key_bytes: 16,
            max_properties: 4,
            max_string_bytes: 64,
            max_binary_bytes: 64,
            max_entity_bytes: 512,
        }
    }

    /// Validate one half of an entity key
    pub fn validate_key_part(&self, part: KeyPart, value: &str) -> Result<(), LimitError> {
        if value.is_empty() {
            return Err(LimitError::EmptyKey { part });
        }
        if value.len() > self.max_key_bytes {
            return Err(LimitError::KeyTooLong {
                part,
                actual: value.len(),
                max: self.max_key_bytes,
            });
        }
        if let Some(ch) = value
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
        {
            return Err(LimitError::InvalidKeyCharacter { part, ch });
        }
        Ok(())
    }

    /// Validate an entity key
    pub fn validate_key(&self, key: &EntityKey) -> Result<(), LimitError> {
        self.validate_key_part(KeyPart::Partition, &key.partition_key)?;
        self.validate_key_part(KeyPart::Row, &key.row_key)
    }

    /// Validate an entity key and its property payload
    ///
    /// Checks, in order: key shape, property count, each property's name and
    /// value size, then the total entity size.
    pub fn validate_entity(
        &self,
        key: &EntityKey,
        properties: &PropertyMap,
    ) -> Result<(), LimitError> {
        self.validate_key(key)?;

        if properties.len() > self.max_properties {
            return Err(LimitError::TooManyProperties {
                actual: properties.len(),
                max: self.max_properties,
            });
        }

        // 4 bytes overhead, plus both keys as UTF-16
        let mut size = 4 + 2 * (utf16_len(&key.partition_key) + utf16_len(&key.row_key));

        for (name, value) in properties {
            validate_property_name(name)?;

            let (len, max) = match value {
                crate::PropertyValue::String(s) => (s.len(), self.max_string_bytes),
                crate::PropertyValue::Binary(b) => (b.len(), self.max_binary_bytes),
                _ => (0, usize::MAX),
            };
            if let crate::PropertyValue::DateTime(t) = value {
                if t.timestamp_subsec_nanos() % 100 != 0 {
                    return Err(LimitError::SubTickDateTime { name: name.clone() });
                }
            }
            if len > max {
                return Err(LimitError::PropertyTooLarge {
                    name: name.clone(),
                    actual: len,
                    max,
                });
            }

            size += 8 + 2 * utf16_len(name) + value.encoded_size();
        }

        if size > self.max_entity_bytes {
            return Err(LimitError::EntityTooLarge {
                actual: size,
                max: self.max_entity_bytes,
            });
        }
        Ok(())
    }
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn validate_property_name(name: &str) -> Result<(), LimitError> {
    if name.is_empty() || name.chars().count() > MAX_PROPERTY_NAME_CHARS {
        return Err(LimitError::InvalidPropertyName {
            name: name.to_string(),
        });
    }
    if SYSTEM_PROPERTIES.contains(&name) || name.starts_with("odata.") || name.contains("@odata") {
        return Err(LimitError::ReservedPropertyName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Limit validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Key is empty
    #[error("{part} must not be empty")]
    EmptyKey {
        /// Which key
        part: KeyPart,
    },

    /// Key exceeds maximum length
    #[error("{part} too long: {actual} bytes exceeds maximum {max}")]
    KeyTooLong {
        /// Which key
        part: KeyPart,
        /// Actual key length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Key holds a disallowed character
    #[error("{part} contains disallowed character {ch:?}")]
    InvalidKeyCharacter {
        /// Which key
        part: KeyPart,
        /// Offending character
        ch: char,
    },

    /// Too many user properties
    #[error("Too many properties: {actual} exceeds maximum {max}")]
    TooManyProperties {
        /// Actual count
        actual: usize,
        /// Maximum allowed count
        max: usize,
    },

    /// Property name empty or too long
    #[error("Invalid property name {name:?}")]
    InvalidPropertyName {
        /// Offending name
        name: String,
    },

    /// Property name is owned by the service
    #[error("Property name {name:?} is reserved")]
    ReservedPropertyName {
        /// Offending name
        name: String,
    },

    /// Single property value too large
    #[error("Property {name:?} too large: {actual} bytes exceeds maximum {max}")]
    PropertyTooLarge {
        /// Property name
        name: String,
        /// Actual size
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// DateTime finer than a 100ns tick
    #[error("Property {name:?} has sub-tick DateTime precision")]
    SubTickDateTime {
        /// Property name
        name: String,
    },

    /// Whole entity too large
    #[error("Entity too large: {actual} bytes exceeds maximum {max}")]
    EntityTooLarge {
        /// Actual size
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },
}

impl LimitError {
    /// Reason code reported alongside `InvalidEntity`
    pub fn reason_code(&self) -> &'static str {
        match self {
            LimitError::EmptyKey { .. } => "empty_key",
            LimitError::KeyTooLong { .. } => "key_too_long",
            LimitError::InvalidKeyCharacter { .. } => "invalid_key_character",
            LimitError::TooManyProperties { .. } => "too_many_properties",
            LimitError::InvalidPropertyName { .. } => "invalid_property_name",
            LimitError::ReservedPropertyName { .. } => "reserved_property_name",
            LimitError::PropertyTooLarge { .. } => "property_too_large",
            LimitError::SubTickDateTime { .. } => "sub_tick_datetime",
            LimitError::EntityTooLarge { .. } => "entity_too_large",
        }
    }
}
