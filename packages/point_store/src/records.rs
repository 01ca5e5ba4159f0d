//! Conversion of raw source records into validated snapshots.
//!
//! All stores funnel through [`assemble`], so the same coordinate and
//! uniqueness rules apply regardless of where the records came from.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use watermap_point_models::{Point, Snapshot};

use crate::{PointStoreError, next_version};

/// Fields with a fixed meaning. Everything else becomes an attribute.
const RESERVED_FIELDS: &[&str] = &[
    "id",
    "name",
    "latitude",
    "longitude",
    "coordinates",
    "description",
];

/// Decodes a payload that must be a JSON array of records.
///
/// # Errors
///
/// Returns [`PointStoreError::SourceUnavailable`] if the payload is not
/// valid JSON or is not an array.
pub fn parse_payload(store: &str, bytes: &[u8]) -> Result<Vec<Value>, PointStoreError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PointStoreError::unavailable(store, format!("malformed JSON: {e}")))?;

    match value {
        Value::Array(records) => Ok(records),
        other => Err(PointStoreError::unavailable(
            store,
            format!("expected a JSON array of records, found {}", kind_of(&other)),
        )),
    }
}

/// Converts decoded JSON records into points.
///
/// When `generate_ids` is set, records without an `id` use their position
/// in the payload instead.
///
/// # Errors
///
/// Returns [`PointStoreError::Schema`] for the first record missing a
/// required field.
pub fn points_from_json(
    store: &str,
    records: Vec<Value>,
    generate_ids: bool,
) -> Result<Vec<Point>, PointStoreError> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            point_from_json(index, record, generate_ids).map_err(|message| {
                PointStoreError::Schema {
                    store: store.to_string(),
                    record: index,
                    message,
                }
            })
        })
        .collect()
}

fn point_from_json(index: usize, record: Value, generate_ids: bool) -> Result<Point, String> {
    let Value::Object(mut fields) = record else {
        return Err(format!("expected an object, found {}", kind_of(&record)));
    };

    let id = match fields.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => return Err("'id' is empty".to_string()),
        Some(Value::Number(n)) => n.to_string(),
        None | Some(Value::Null) if generate_ids => index.to_string(),
        None | Some(Value::Null) => return Err("missing required field 'id'".to_string()),
        Some(other) => return Err(format!("'id' must be a string or integer, found {}", kind_of(other))),
    };

    let name = match fields.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::String(_)) => return Err("'name' is empty".to_string()),
        None | Some(Value::Null) => return Err("missing required field 'name'".to_string()),
        Some(other) => return Err(format!("'name' must be a string, found {}", kind_of(other))),
    };

    let (longitude, latitude) = coordinate_from_fields(&fields)?;

    let description = match fields.get("description") {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(format!(
                "'description' must be a string, found {}",
                kind_of(other)
            ));
        }
    };

    for key in RESERVED_FIELDS {
        fields.remove(*key);
    }

    Ok(Point {
        id,
        name,
        longitude,
        latitude,
        description,
        attributes: fields.into_iter().collect::<BTreeMap<_, _>>(),
    })
}

/// Reads the coordinate from either `coordinates: [lng, lat]` or separate
/// `longitude` / `latitude` fields.
fn coordinate_from_fields(fields: &Map<String, Value>) -> Result<(f64, f64), String> {
    if let Some(coordinates) = fields.get("coordinates").filter(|v| !v.is_null()) {
        let Value::Array(pair) = coordinates else {
            return Err("'coordinates' must be a [longitude, latitude] array".to_string());
        };
        if pair.len() != 2 {
            return Err(format!(
                "'coordinates' must have exactly 2 elements, found {}",
                pair.len()
            ));
        }
        let longitude = number(&pair[0]).ok_or("'coordinates[0]' is not a number")?;
        let latitude = number(&pair[1]).ok_or("'coordinates[1]' is not a number")?;
        return Ok((longitude, latitude));
    }

    let longitude = match fields.get("longitude") {
        None | Some(Value::Null) => return Err("missing required field 'longitude'".to_string()),
        Some(v) => number(v).ok_or("'longitude' is not a number")?,
    };
    let latitude = match fields.get("latitude") {
        None | Some(Value::Null) => return Err("missing required field 'latitude'".to_string()),
        Some(v) => number(v).ok_or("'latitude' is not a number")?,
    };

    Ok((longitude, latitude))
}

/// Numbers, or strings holding a number (some databases serialize decimals
/// as strings).
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validates points and wraps them in a freshly versioned snapshot.
///
/// # Errors
///
/// Returns [`PointStoreError::Schema`] if any coordinate is non-finite or
/// out of range, or if an id appears twice.
pub fn assemble(store: &str, points: Vec<Point>) -> Result<Snapshot, PointStoreError> {
    let mut seen = BTreeSet::new();

    for (index, point) in points.iter().enumerate() {
        if !point.has_valid_coordinate() {
            return Err(PointStoreError::Schema {
                store: store.to_string(),
                record: index,
                message: format!(
                    "invalid coordinate ({}, {}) for '{}'",
                    point.longitude, point.latitude, point.id
                ),
            });
        }
        if !seen.insert(point.id.as_str()) {
            return Err(PointStoreError::Schema {
                store: store.to_string(),
                record: index,
                message: format!("duplicate id '{}'", point.id),
            });
        }
    }

    let snapshot = Snapshot::new(next_version(), store, points);
    log::info!(
        "Loaded {} points from '{store}' as snapshot {}",
        snapshot.len(),
        snapshot.version()
    );
    Ok(snapshot)
}
