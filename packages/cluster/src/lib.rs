#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hierarchical spatial cluster index.
//!
//! Built once from a point [`Snapshot`], the index answers "which clusters
//! and points are visible at zoom `z` inside this viewport" with an R-tree
//! range lookup on a precomputed level, independent of how many points
//! fall outside the viewport.
//!
//! # Construction
//!
//! Points are projected into the Mercator unit square and seed the level
//! at `max_zoom + 1`, where every point is its own leaf. Each coarser level
//! is derived from the one below it: nodes within `radius` pixels of each
//! other at that zoom merge into a cluster positioned at their point-count
//! weighted mean. Positions are therefore accumulated level by level
//! rather than recomputed from raw points.
//!
//! Construction is deterministic: the same snapshot always yields the same
//! clusters, centroids and ids.

pub mod projection;
pub mod viewport;

mod level;

use std::sync::Arc;
use std::time::Instant;

use watermap_point_models::{BoundingBox, Point, Snapshot, SnapshotVersion};

use level::{BuildContext, Level, Node, NodeKind, decode_local_id};
use projection::{lat_y, lng_x, unit_radius, x_lng, y_lat};
use viewport::Viewport;

pub use watermap_cluster_models::{
    ClusterId, ClusterNode, ClusterOptions, ClusterSummary, LOCAL_BITS, MAX_ID, MAX_SUPPORTED_ZOOM,
};

/// Largest snapshot whose cluster ids fit in [`LOCAL_BITS`].
pub const MAX_POINTS: usize = 1 << (LOCAL_BITS - 6);

/// Errors from building or querying a cluster index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The viewport or zoom level is not usable.
    #[error("Invalid viewport: {message}")]
    InvalidViewport {
        /// Description of what went wrong.
        message: String,
    },

    /// The cluster id does not belong to this index build.
    #[error("Unknown cluster {0}")]
    UnknownCluster(ClusterId),

    /// A point has a non-finite or out-of-range coordinate.
    #[error("Point '{id}' has an invalid coordinate")]
    InvalidCoordinate {
        /// Id of the offending point.
        id: String,
    },

    /// The clustering options are not usable.
    #[error("Invalid cluster options: {message}")]
    InvalidOptions {
        /// Description of what went wrong.
        message: String,
    },

    /// The snapshot is too large for the cluster id encoding.
    #[error("Snapshot has {count} points; at most {max} are supported", max = MAX_POINTS)]
    TooManyPoints {
        /// Number of points in the snapshot.
        count: usize,
    },
}

/// A built, immutable cluster index over one snapshot.
///
/// Safe to share between threads; every query is a read-only traversal.
pub struct ClusterIndex {
    options: ClusterOptions,
    snapshot: Arc<Snapshot>,
    generation: u64,
    /// `levels[z - min_zoom]` holds the nodes visible at zoom `z`, for
    /// `z` in `min_zoom..=max_zoom + 1`.
    levels: Vec<Level>,
}

impl ClusterIndex {
    /// Builds the index for `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidOptions`] for unusable options,
    /// [`IndexError::InvalidCoordinate`] if any point has a bad coordinate,
    /// or [`IndexError::TooManyPoints`] if the snapshot is too large.
    pub fn build(snapshot: Arc<Snapshot>, options: ClusterOptions) -> Result<Self, IndexError> {
        options
            .validate()
            .map_err(|message| IndexError::InvalidOptions { message })?;

        if snapshot.len() > MAX_POINTS {
            return Err(IndexError::TooManyPoints {
                count: snapshot.len(),
            });
        }

        let start = Instant::now();

        let leaves = snapshot
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if p.has_valid_coordinate() {
                    Ok(Node::leaf(i, lng_x(p.longitude), lat_y(p.latitude)))
                } else {
                    Err(IndexError::InvalidCoordinate { id: p.id.clone() })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let generation = ClusterId::generation_of(snapshot.version());
        let ctx = BuildContext {
            options: &options,
            generation,
            total_points: snapshot.len(),
        };

        let mut levels = Vec::with_capacity(usize::from(options.max_zoom - options.min_zoom) + 2);
        let mut current = Level::new(leaves);

        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let coarser = current.cluster(zoom, &ctx);
            levels.push(current);
            current = Level::new(coarser);
        }
        levels.push(current);
        levels.reverse();

        log::info!(
            "Built cluster index for snapshot {} ({} points, zoom {}..={}) in {:.2?}",
            snapshot.version(),
            snapshot.len(),
            options.min_zoom,
            options.max_zoom,
            start.elapsed()
        );

        Ok(Self {
            options,
            snapshot,
            generation,
            levels,
        })
    }

    /// Version of the snapshot this index was built from.
    #[must_use]
    pub fn version(&self) -> SnapshotVersion {
        self.snapshot.version()
    }

    /// The snapshot this index was built from.
    #[must_use]
    pub const fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// The options used for construction.
    #[must_use]
    pub const fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Number of nodes visible at `zoom` (clamped to the built range).
    #[must_use]
    pub fn node_count(&self, zoom: u8) -> usize {
        self.level(zoom).nodes.len()
    }

    /// Returns every cluster and leaf visible inside `bbox` at `zoom`.
    ///
    /// `zoom` is floored. Results come in a stable but otherwise
    /// unspecified order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidViewport`] if the viewport is invalid
    /// or the floored zoom is outside `0..=max_zoom`.
    pub fn query(&self, bbox: &BoundingBox, zoom: f64) -> Result<Vec<ClusterNode<'_>>, IndexError> {
        let zoom = self.validate_zoom(zoom)?;
        let viewport = Viewport::normalize(bbox)?;
        let level = self.level(zoom);

        let mut nodes = Vec::new();
        for span in viewport.spans() {
            let ids = level.range(
                lng_x(span.west),
                lat_y(span.north),
                lng_x(span.east),
                lat_y(span.south),
            );
            nodes.extend(ids.into_iter().map(|i| self.node(&level.nodes[i])));
        }

        log::debug!(
            "Cluster query z{zoom} [{}, {}, {}, {}] -> {} nodes",
            bbox.west,
            bbox.south,
            bbox.east,
            bbox.north,
            nodes.len()
        );

        Ok(nodes)
    }

    /// Returns up to `limit` original points of a cluster, skipping the
    /// first `offset`, in depth-first order of the hierarchy. `None` means
    /// no limit.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCluster`] if `id` is not a cluster of
    /// this index build.
    pub fn expand(
        &self,
        id: ClusterId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<&Point>, IndexError> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut leaves = Vec::new();
        if limit == 0 {
            // Still reject ids from other builds.
            self.children_of(id)?;
        } else {
            self.append_leaves(&mut leaves, id, limit, offset, 0)?;
        }
        Ok(leaves)
    }

    /// Returns the immediate children of a cluster, one zoom level finer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCluster`] if `id` is not a cluster of
    /// this index build.
    pub fn children(&self, id: ClusterId) -> Result<Vec<ClusterNode<'_>>, IndexError> {
        let (level, ids) = self.children_of(id)?;
        Ok(ids.into_iter().map(|i| self.node(&level.nodes[i])).collect())
    }

    /// Returns the zoom at which a cluster first splits into more than one
    /// child.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCluster`] if `id` is not a cluster of
    /// this index build.
    pub fn expansion_zoom(&self, id: ClusterId) -> Result<u8, IndexError> {
        let (_, origin_zoom) = self.decode(id)?;
        let mut zoom = origin_zoom - 1;
        let mut current = id;

        while zoom <= self.options.max_zoom {
            let (level, children) = self.children_of(current)?;
            zoom += 1;
            if children.len() != 1 {
                break;
            }
            match level.nodes[children[0]].kind {
                NodeKind::Cluster(child) => current = child,
                NodeKind::Leaf(_) => break,
            }
        }

        Ok(zoom)
    }

    /// Looks up the summary of a cluster by id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::UnknownCluster`] if `id` is not a cluster of
    /// this index build.
    pub fn summary(&self, id: ClusterId) -> Result<ClusterSummary, IndexError> {
        let (_, origin_zoom) = self.decode(id)?;
        let level = self.level(origin_zoom - 1);
        level
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Cluster(id))
            .map(|n| self.summarize(n, id))
            .ok_or(IndexError::UnknownCluster(id))
    }

    fn validate_zoom(&self, zoom: f64) -> Result<u8, IndexError> {
        let floored = zoom.floor();
        if !floored.is_finite() || floored < 0.0 || floored > f64::from(self.options.max_zoom) {
            return Err(IndexError::InvalidViewport {
                message: format!(
                    "zoom {zoom} is outside 0..={}",
                    self.options.max_zoom
                ),
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(floored as u8)
    }

    fn level(&self, zoom: u8) -> &Level {
        let zoom = zoom.clamp(self.options.min_zoom, self.options.max_zoom + 1);
        &self.levels[usize::from(zoom - self.options.min_zoom)]
    }

    /// Splits `id` into `(origin index, origin zoom)` after checking that it
    /// could belong to this build.
    fn decode(&self, id: ClusterId) -> Result<(usize, u8), IndexError> {
        if id.generation() != self.generation {
            return Err(IndexError::UnknownCluster(id));
        }
        let (origin_index, origin_zoom) =
            decode_local_id(id.local(), self.snapshot.len()).ok_or(IndexError::UnknownCluster(id))?;
        if origin_zoom <= self.options.min_zoom || origin_zoom > self.options.max_zoom + 1 {
            return Err(IndexError::UnknownCluster(id));
        }
        if origin_index >= self.level(origin_zoom).nodes.len() {
            return Err(IndexError::UnknownCluster(id));
        }
        Ok((origin_index, origin_zoom))
    }

    /// The level a cluster was formed from and the indices of its members
    /// there.
    fn children_of(&self, id: ClusterId) -> Result<(&Level, Vec<usize>), IndexError> {
        let (origin_index, origin_zoom) = self.decode(id)?;
        let level = self.level(origin_zoom);
        let origin = &level.nodes[origin_index];
        let r = unit_radius(self.options.radius, self.options.extent, origin_zoom - 1);

        let children: Vec<usize> = level
            .within(origin.x, origin.y, r)
            .into_iter()
            .filter(|&i| level.nodes[i].parent == Some(id))
            .collect();

        if children.is_empty() {
            return Err(IndexError::UnknownCluster(id));
        }
        Ok((level, children))
    }

    fn append_leaves<'a>(
        &'a self,
        out: &mut Vec<&'a Point>,
        id: ClusterId,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize, IndexError> {
        let (level, children) = self.children_of(id)?;

        for i in children {
            let node = &level.nodes[i];
            match node.kind {
                NodeKind::Cluster(child) => {
                    if skipped + node.point_count <= offset {
                        skipped += node.point_count;
                    } else {
                        skipped = self.append_leaves(out, child, limit, offset, skipped)?;
                    }
                }
                NodeKind::Leaf(index) => {
                    if skipped < offset {
                        skipped += 1;
                    } else {
                        out.push(&self.snapshot.points()[index]);
                    }
                }
            }
            if out.len() >= limit {
                break;
            }
        }

        Ok(skipped)
    }

    fn node(&self, node: &Node) -> ClusterNode<'_> {
        match node.kind {
            NodeKind::Leaf(index) => ClusterNode::Leaf(&self.snapshot.points()[index]),
            NodeKind::Cluster(id) => ClusterNode::Cluster(self.summarize(node, id)),
        }
    }

    fn summarize(&self, node: &Node, id: ClusterId) -> ClusterSummary {
        let zoom = decode_local_id(id.local(), self.snapshot.len())
            .map_or(self.options.min_zoom, |(_, origin_zoom)| origin_zoom - 1);
        ClusterSummary {
            id,
            longitude: x_lng(node.x),
            latitude: y_lat(node.y),
            point_count: node.point_count,
            zoom,
        }
    }
}
