#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cluster identifiers, node types and clustering options.
//!
//! This crate contains only data types and configuration structs. The
//! index itself lives in `watermap_cluster`.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use watermap_point_models::{Point, SnapshotVersion};

/// Total width of a [`ClusterId`]. Ids stay exactly representable as
/// JSON numbers read into an IEEE-754 double.
pub const ID_BITS: u32 = 53;

/// Number of low bits holding the build-local part of a [`ClusterId`].
pub const LOCAL_BITS: u32 = 36;

/// Number of high bits holding the generation. Generations wrap modulo
/// `1 << GENERATION_BITS`.
pub const GENERATION_BITS: u32 = ID_BITS - LOCAL_BITS;

/// Largest id any build can emit.
pub const MAX_ID: u64 = (1 << ID_BITS) - 1;

const LOCAL_MASK: u64 = (1 << LOCAL_BITS) - 1;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Opaque identifier of an aggregate cluster.
///
/// The high bits carry the generation (snapshot version, wrapped to
/// [`GENERATION_BITS`]) of the index that produced it, so an id is only
/// meaningful to that one build. Clients holding an id across a rebuild get
/// an unknown-cluster error. Every id is at most [`MAX_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(u64);

impl ClusterId {
    /// Combines a generation and a build-local id.
    #[must_use]
    pub const fn new(generation: u64, local: u64) -> Self {
        Self(((generation & GENERATION_MASK) << LOCAL_BITS) | (local & LOCAL_MASK))
    }

    /// Reinterprets a raw id received from a client.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id, as sent to clients.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The generation part.
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0 >> LOCAL_BITS
    }

    /// The build-local part.
    #[must_use]
    pub const fn local(self) -> u64 {
        self.0 & LOCAL_MASK
    }

    /// The generation tag used for ids built from `version`.
    #[must_use]
    pub const fn generation_of(version: SnapshotVersion) -> u64 {
        version.value() & GENERATION_MASK
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClusterId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// An aggregate of two or more points at some zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    /// Identifier, valid for the index build that produced it.
    pub id: ClusterId,
    /// Weighted centroid longitude.
    pub longitude: f64,
    /// Weighted centroid latitude.
    pub latitude: f64,
    /// Number of original points in the cluster.
    pub point_count: usize,
    /// Zoom level at which the cluster was first formed.
    pub zoom: u8,
}

/// One renderable node: an aggregate cluster or a single original point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterNode<'a> {
    /// Two or more points merged at this zoom.
    Cluster(ClusterSummary),
    /// A single point.
    Leaf(&'a Point),
}

impl ClusterNode<'_> {
    /// Position of the node as `[longitude, latitude]`.
    #[must_use]
    pub const fn coordinates(&self) -> [f64; 2] {
        match self {
            Self::Cluster(c) => [c.longitude, c.latitude],
            Self::Leaf(p) => p.coordinates(),
        }
    }

    /// Number of original points the node stands for.
    #[must_use]
    pub const fn point_count(&self) -> usize {
        match self {
            Self::Cluster(c) => c.point_count,
            Self::Leaf(_) => 1,
        }
    }

    /// Returns `true` for aggregate clusters.
    #[must_use]
    pub const fn is_cluster(&self) -> bool {
        matches!(self, Self::Cluster(_))
    }
}

/// Highest supported `max_zoom`. Cluster ids store `zoom + 1` in 5 bits.
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Tuning for cluster construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Merge radius in pixels.
    pub radius: f64,
    /// Tile extent in pixels; the radius is relative to it.
    pub extent: f64,
    /// Coarsest zoom level that gets its own level.
    pub min_zoom: u8,
    /// Finest zoom level at which points still merge.
    pub max_zoom: u8,
    /// Minimum number of points to form a cluster.
    pub min_points: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            radius: 25.0,
            extent: 512.0,
            min_zoom: 0,
            max_zoom: 20,
            min_points: 2,
        }
    }
}

impl ClusterOptions {
    /// Checks that the options describe a buildable index.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(format!("radius must be positive, got {}", self.radius));
        }
        if !(self.extent.is_finite() && self.extent > 0.0) {
            return Err(format!("extent must be positive, got {}", self.extent));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(format!(
                "max_zoom must be at most {MAX_SUPPORTED_ZOOM}, got {}",
                self.max_zoom
            ));
        }
        if self.min_zoom > self.max_zoom {
            return Err(format!(
                "min_zoom ({}) must not exceed max_zoom ({})",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.min_points < 2 {
            return Err(format!("min_points must be at least 2, got {}", self.min_points));
        }
        Ok(())
    }
}
