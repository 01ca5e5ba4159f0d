#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point, snapshot and bounding box types.
//!
//! A [`Snapshot`] is the immutable, versioned set of [`Point`]s loaded from
//! a point source at one instant. The cluster index and the search ranker
//! both read from a shared snapshot and never mutate it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, geolocated entity (water body, company, city, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    /// Identifier, unique within a snapshot.
    pub id: String,
    /// Display name used for search.
    pub name: String,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Optional free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Any other source fields, passed through untouched (e.g. `logoUrl`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Point {
    /// Creates a point with no description or attributes.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            longitude,
            latitude,
            description: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Returns `true` if both coordinates are finite and within WGS84
    /// bounds.
    #[must_use]
    pub fn has_valid_coordinate(&self) -> bool {
        is_valid_coordinate(self.longitude, self.latitude)
    }

    /// The coordinate as `[longitude, latitude]`, the `GeoJSON` order.
    #[must_use]
    pub const fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Returns `true` if `longitude` is in `[-180, 180]` and `latitude` is in
/// `[-90, 90]`. NaN and infinities are rejected.
#[must_use]
pub fn is_valid_coordinate(longitude: f64, latitude: f64) -> bool {
    longitude.is_finite()
        && latitude.is_finite()
        && (-180.0..=180.0).contains(&longitude)
        && (-90.0..=90.0).contains(&latitude)
}

/// Monotonically increasing identifier of a loaded [`Snapshot`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SnapshotVersion(pub u64);

impl SnapshotVersion {
    /// The raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// An immutable, ordered set of points loaded at one instant.
///
/// Point order is the order of the source and is significant: it drives
/// cluster construction order and search tie-breaking.
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: SnapshotVersion,
    source: String,
    loaded_at: DateTime<Utc>,
    points: Vec<Point>,
}

impl Snapshot {
    /// Wraps an already validated point list.
    #[must_use]
    pub fn new(version: SnapshotVersion, source: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            version,
            source: source.into(),
            loaded_at: Utc::now(),
            points,
        }
    }

    /// Version of this snapshot.
    #[must_use]
    pub const fn version(&self) -> SnapshotVersion {
        self.version
    }

    /// Name of the source the points were loaded from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// When the snapshot was loaded.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// All points in source order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the snapshot holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A map viewport in WGS84 degrees.
///
/// Longitudes may be unwrapped (e.g. `east = 190`) to express a viewport
/// that crosses the anti-meridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The whole world.
    #[must_use]
    pub const fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }
}

/// Where a point source reads its records from.
///
/// Tagged by `type` in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A JSON file holding an array of point records.
    JsonFile {
        /// Path to the file.
        path: PathBuf,
        /// Use the record position as id when a record has none.
        #[serde(default)]
        generate_ids: bool,
    },
    /// A table in a `DuckDB` database with `id`, `name`, `latitude`,
    /// `longitude` and `description` columns.
    Duckdb {
        /// Path to the database file.
        path: PathBuf,
        /// Table name.
        table: String,
    },
    /// An HTTP endpoint returning a JSON array of point records.
    Http {
        /// Endpoint URL.
        url: String,
        /// Request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

const fn default_timeout_secs() -> u64 {
    30
}
