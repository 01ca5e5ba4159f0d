//! One zoom level of the cluster hierarchy.
//!
//! A level holds the nodes visible at its zoom (leaves and clusters) and an
//! R-tree over their projected positions. Coarser levels are derived from
//! finer ones by [`Level::cluster`]; raw points are only scanned once, to
//! seed the finest level.

use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use watermap_cluster_models::{ClusterId, ClusterOptions};

use crate::projection::unit_radius;

type Entry = GeomWithData<[f64; 2], usize>;

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// An original point, by snapshot index.
    Leaf(usize),
    /// An aggregate cluster.
    Cluster(ClusterId),
}

/// A leaf or cluster as seen at one zoom level.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub x: f64,
    pub y: f64,
    pub point_count: usize,
    pub kind: NodeKind,
    /// The cluster this node merged into at the next coarser zoom.
    pub parent: Option<ClusterId>,
}

impl Node {
    pub const fn leaf(index: usize, x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            point_count: 1,
            kind: NodeKind::Leaf(index),
            parent: None,
        }
    }

    /// A copy passed unchanged to the next coarser level.
    const fn carried(&self) -> Self {
        Self {
            x: self.x,
            y: self.y,
            point_count: self.point_count,
            kind: self.kind,
            parent: None,
        }
    }
}

/// Inputs shared by every clustering pass of one build.
pub(crate) struct BuildContext<'a> {
    pub options: &'a ClusterOptions,
    pub generation: u64,
    pub total_points: usize,
}

impl BuildContext<'_> {
    /// Encodes the id of a cluster formed at `zoom` around the node at
    /// `origin` in the finer level. Decoded by [`decode_local_id`].
    #[allow(clippy::cast_possible_truncation)]
    fn cluster_id(&self, origin: usize, zoom: u8) -> ClusterId {
        let local = ((origin as u64) << 5) + u64::from(zoom) + 1 + self.total_points as u64;
        ClusterId::new(self.generation, local)
    }
}

/// Splits a build-local id into `(origin index, origin zoom)`, where origin
/// zoom is the finer level the cluster was formed from. Returns `None` for
/// ids that cannot have been produced by a build over `total_points`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn decode_local_id(local: u64, total_points: usize) -> Option<(usize, u8)> {
    let offset = local.checked_sub(total_points as u64)?;
    let origin_zoom = (offset % 32) as u8;
    let origin_index = usize::try_from(offset >> 5).ok()?;
    Some((origin_index, origin_zoom))
}

pub(crate) struct Level {
    pub nodes: Vec<Node>,
    tree: RTree<Entry>,
}

impl Level {
    pub fn new(nodes: Vec<Node>) -> Self {
        let entries = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| GeomWithData::new([n.x, n.y], i))
            .collect();
        Self {
            nodes,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Indices of nodes within `r` of `(x, y)`, in node order.
    pub fn within(&self, x: f64, y: f64, r: f64) -> Vec<usize> {
        let mut ids: Vec<usize> = self
            .tree
            .locate_within_distance([x, y], r * r)
            .map(|e| e.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Indices of nodes inside the unit-space rectangle, in node order.
    pub fn range(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<usize> {
        let envelope = AABB::from_corners([min_x, min_y], [max_x, max_y]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|e| e.data)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Produces the nodes of the next coarser level, `zoom`.
    ///
    /// Each unclaimed node absorbs every unclaimed neighbor within the
    /// merge radius. The new cluster's position is the point-count weighted
    /// mean of the absorbed positions. Absorbed nodes record the new
    /// cluster as their parent so it can be expanded later.
    pub fn cluster(&mut self, zoom: u8, ctx: &BuildContext<'_>) -> Vec<Node> {
        let r = unit_radius(ctx.options.radius, ctx.options.extent, zoom);
        let mut claimed = vec![false; self.nodes.len()];
        let mut next = Vec::new();

        for i in 0..self.nodes.len() {
            if claimed[i] {
                continue;
            }
            claimed[i] = true;

            let (x, y, origin_count) = {
                let node = &self.nodes[i];
                (node.x, node.y, node.point_count)
            };
            let neighbors: Vec<usize> = self
                .within(x, y, r)
                .into_iter()
                .filter(|&j| !claimed[j])
                .collect();

            let point_count = origin_count
                + neighbors
                    .iter()
                    .map(|&j| self.nodes[j].point_count)
                    .sum::<usize>();

            if point_count > origin_count && point_count >= ctx.options.min_points {
                let id = ctx.cluster_id(i, zoom);
                #[allow(clippy::cast_precision_loss)]
                let (mut wx, mut wy) = (x * origin_count as f64, y * origin_count as f64);

                for &j in &neighbors {
                    claimed[j] = true;
                    let node = &mut self.nodes[j];
                    #[allow(clippy::cast_precision_loss)]
                    let weight = node.point_count as f64;
                    wx += node.x * weight;
                    wy += node.y * weight;
                    node.parent = Some(id);
                }
                self.nodes[i].parent = Some(id);

                #[allow(clippy::cast_precision_loss)]
                let total = point_count as f64;
                next.push(Node {
                    x: wx / total,
                    y: wy / total,
                    point_count,
                    kind: NodeKind::Cluster(id),
                    parent: None,
                });
            } else {
                next.push(self.nodes[i].carried());
                if point_count > 1 {
                    for &j in &neighbors {
                        claimed[j] = true;
                        next.push(self.nodes[j].carried());
                    }
                }
            }
        }

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(options: &ClusterOptions, total_points: usize) -> BuildContext<'_> {
        BuildContext {
            options,
            generation: 1,
            total_points,
        }
    }

    #[test]
    fn local_ids_decode_to_origin() {
        let options = ClusterOptions::default();
        let ctx = ctx(&options, 1_000);
        let id = ctx.cluster_id(321, 7);
        assert_eq!(decode_local_id(id.local(), 1_000), Some((321, 8)));
    }

    #[test]
    fn leaf_sized_ids_do_not_decode() {
        assert_eq!(decode_local_id(10, 1_000), None);
    }

    #[test]
    fn nearby_nodes_merge_with_weighted_position() {
        let options = ClusterOptions::default();
        let mut level = Level::new(vec![
            Node::leaf(0, 0.5, 0.5),
            Node::leaf(1, 0.5 + 1e-9, 0.5),
            Node::leaf(2, 0.9, 0.9),
        ]);

        let next = level.cluster(10, &ctx(&options, 3));

        assert_eq!(next.len(), 2);
        assert_eq!(next[0].point_count, 2);
        assert!(matches!(next[0].kind, NodeKind::Cluster(_)));
        assert!((next[0].x - (0.5 + 0.5e-9)).abs() < 1e-15);
        assert_eq!(next[1].kind, NodeKind::Leaf(2));

        let NodeKind::Cluster(id) = next[0].kind else {
            unreachable!()
        };
        assert_eq!(level.nodes[0].parent, Some(id));
        assert_eq!(level.nodes[1].parent, Some(id));
        assert_eq!(level.nodes[2].parent, None);
    }

    #[test]
    fn min_points_holds_back_small_groups() {
        let options = ClusterOptions {
            min_points: 3,
            ..ClusterOptions::default()
        };
        let mut level = Level::new(vec![Node::leaf(0, 0.5, 0.5), Node::leaf(1, 0.5, 0.5)]);

        let next = level.cluster(10, &ctx(&options, 2));

        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|n| matches!(n.kind, NodeKind::Leaf(_))));
        assert!(level.nodes.iter().all(|n| n.parent.is_none()));
    }

    #[test]
    fn range_is_inclusive() {
        let level = Level::new(vec![Node::leaf(0, 0.25, 0.25), Node::leaf(1, 0.75, 0.75)]);
        assert_eq!(level.range(0.25, 0.25, 0.5, 0.5), vec![0]);
        assert_eq!(level.range(0.0, 0.0, 1.0, 1.0), vec![0, 1]);
    }
}
