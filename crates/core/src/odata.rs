//! OData JSON entity codec
//!
//! Converts between [`Entity`] / [`PropertyMap`] and the Table service's
//! JSON entity representation. Types that plain JSON cannot carry are
//! annotated with a sibling `<name>@odata.type` member:
//!
//! ```json
//! {
//!   "PartitionKey": "part1",
//!   "RowKey": "row1",
//!   "myValue": "value1",
//!   "count": 7,
//!   "big": "9007199254740993",
//!   "big@odata.type": "Edm.Int64"
//! }
//! ```
//!
//! Unannotated numbers decode as `Int32` when they fit, otherwise `Int64`
//! for integers and `Double` for the rest. `null` members are treated as
//! absent.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value as Json};
use uuid::Uuid;

use crate::entity::{format_timestamp, Entity, EntityKey};
use crate::error::{TableError, TableResult};
use crate::value::{PropertyMap, PropertyValue};

const TYPE_SUFFIX: &str = "@odata.type";

/// Encode a stored entity, including system properties and its ETag
pub fn entity_to_json(entity: &Entity) -> Json {
    let mut obj = Map::new();
    obj.insert("odata.etag".into(), Json::String(entity.etag.to_string()));
    obj.insert(
        "PartitionKey".into(),
        Json::String(entity.key.partition_key.clone()),
    );
    obj.insert("RowKey".into(), Json::String(entity.key.row_key.clone()));
    obj.insert(
        "Timestamp".into(),
        Json::String(format_timestamp(&entity.timestamp)),
    );
    obj.insert(
        format!("Timestamp{TYPE_SUFFIX}"),
        Json::String("Edm.DateTime".into()),
    );
    write_properties(&mut obj, &entity.properties);
    Json::Object(obj)
}

/// Encode a bare property map
pub fn properties_to_json(properties: &PropertyMap) -> Json {
    let mut obj = Map::new();
    write_properties(&mut obj, properties);
    Json::Object(obj)
}

fn write_properties(obj: &mut Map<String, Json>, properties: &PropertyMap) {
    for (name, value) in properties {
        let (json, annotate) = encode_value(value);
        obj.insert(name.clone(), json);
        if annotate {
            obj.insert(
                format!("{name}{TYPE_SUFFIX}"),
                Json::String(value.edm_type().into()),
            );
        }
    }
}

/// JSON form of a value, and whether it needs a type annotation
fn encode_value(value: &PropertyValue) -> (Json, bool) {
    match value {
        PropertyValue::String(s) => (Json::String(s.clone()), false),
        PropertyValue::Int32(i) => (Json::Number((*i).into()), false),
        PropertyValue::Bool(b) => (Json::Bool(*b), false),
        PropertyValue::Int64(i) => (Json::String(i.to_string()), true),
        PropertyValue::Double(d) => {
            let json = match Number::from_f64(*d) {
                Some(n) => Json::Number(n),
                None if d.is_nan() => Json::String("NaN".into()),
                None if *d > 0.0 => Json::String("Infinity".into()),
                None => Json::String("-Infinity".into()),
            };
            (json, true)
        }
        PropertyValue::DateTime(t) => (Json::String(format_timestamp(t)), true),
        PropertyValue::Binary(b) => (Json::String(BASE64.encode(b)), true),
        PropertyValue::Guid(g) => (Json::String(g.hyphenated().to_string()), true),
    }
}

/// Decode a request payload into its key (if present) and user properties
///
/// System members (`Timestamp`, `odata.*`) are dropped. `PartitionKey` and
/// `RowKey` must be strings when present.
pub fn parse_payload(payload: &Json) -> TableResult<(Option<EntityKey>, PropertyMap)> {
    let obj = payload
        .as_object()
        .ok_or_else(|| TableError::Serialization("entity payload must be a JSON object".into()))?;

    let partition_key = key_member(obj, "PartitionKey")?;
    let row_key = key_member(obj, "RowKey")?;
    let key = match (partition_key, row_key) {
        (Some(p), Some(r)) => Some(EntityKey::new(p, r)),
        (None, None) => None,
        _ => {
            return Err(TableError::Serialization(
                "payload must carry both PartitionKey and RowKey or neither".into(),
            ))
        }
    };

    let mut properties = PropertyMap::new();
    for (name, json) in obj {
        if is_system_member(name) || name.ends_with(TYPE_SUFFIX) || json.is_null() {
            continue;
        }
        let edm_type = match obj.get(&format!("{name}{TYPE_SUFFIX}")) {
            Some(Json::String(t)) => Some(t.as_str()),
            Some(_) => {
                return Err(TableError::Serialization(format!(
                    "type annotation for {name:?} must be a string"
                )))
            }
            None => None,
        };
        properties.insert(name.clone(), decode_value(name, json, edm_type)?);
    }

    Ok((key, properties))
}

fn is_system_member(name: &str) -> bool {
    matches!(name, "PartitionKey" | "RowKey" | "Timestamp") || name.starts_with("odata.")
}

fn key_member(obj: &Map<String, Json>, name: &str) -> TableResult<Option<String>> {
    match obj.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TableError::Serialization(format!("{name} must be a string"))),
    }
}

fn decode_value(name: &str, json: &Json, edm_type: Option<&str>) -> TableResult<PropertyValue> {
    let bad = |expected: &str| {
        TableError::Serialization(format!("property {name:?}: expected {expected}, got {json}"))
    };

    match edm_type {
        None => match json {
            Json::String(s) => Ok(PropertyValue::String(s.clone())),
            Json::Bool(b) => Ok(PropertyValue::Bool(*b)),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i32::try_from(i)
                        .map(PropertyValue::Int32)
                        .unwrap_or(PropertyValue::Int64(i)))
                } else {
                    n.as_f64().map(PropertyValue::Double).ok_or_else(|| bad("a number"))
                }
            }
            _ => Err(bad("a scalar")),
        },
        Some("Edm.String") => json
            .as_str()
            .map(|s| PropertyValue::String(s.to_string()))
            .ok_or_else(|| bad("a string")),
        Some("Edm.Int32") => json
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(PropertyValue::Int32)
            .ok_or_else(|| bad("a 32-bit integer")),
        Some("Edm.Int64") => match json {
            Json::String(s) => s
                .parse()
                .map(PropertyValue::Int64)
                .map_err(|_| bad("an Int64 string")),
            Json::Number(n) => n
                .as_i64()
                .map(PropertyValue::Int64)
                .ok_or_else(|| bad("an Int64")),
            _ => Err(bad("an Int64")),
        },
        Some("Edm.Double") => match json {
            Json::Number(n) => n.as_f64().map(PropertyValue::Double).ok_or_else(|| bad("a double")),
            Json::String(s) => match s.as_str() {
                "NaN" => Ok(PropertyValue::Double(f64::NAN)),
                "Infinity" => Ok(PropertyValue::Double(f64::INFINITY)),
                "-Infinity" => Ok(PropertyValue::Double(f64::NEG_INFINITY)),
                other => other.parse().map(PropertyValue::Double).map_err(|_| bad("a double")),
            },
            _ => Err(bad("a double")),
        },
        Some("Edm.Boolean") => json
            .as_bool()
            .map(PropertyValue::Bool)
            .ok_or_else(|| bad("a boolean")),
        Some("Edm.DateTime") => json
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| PropertyValue::from(t.with_timezone(&Utc)))
            .ok_or_else(|| bad("an RFC 3339 datetime")),
        Some("Edm.Binary") => json
            .as_str()
            .and_then(|s| BASE64.decode(s).ok())
            .map(PropertyValue::Binary)
            .ok_or_else(|| bad("base64 binary")),
        Some("Edm.Guid") => json
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(PropertyValue::Guid)
            .ok_or_else(|| bad("a GUID")),
        Some(other) => Err(TableError::Serialization(format!(
            "property {name:?}: unsupported type {other}"
        ))),
    }
}
