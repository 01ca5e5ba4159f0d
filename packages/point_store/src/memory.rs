//! Point store serving a fixed, in-memory point list.

use async_trait::async_trait;
use watermap_point_models::{Point, Snapshot};

use crate::{PointStore, PointStoreError, records};

/// Serves the same points on every load, each time as a new snapshot.
pub struct MemoryPointStore {
    name: String,
    points: Vec<Point>,
}

impl MemoryPointStore {
    /// Creates a store over `points`.
    #[must_use]
    pub fn new(name: &str, points: Vec<Point>) -> Self {
        Self {
            name: name.to_string(),
            points,
        }
    }
}

#[async_trait]
impl PointStore for MemoryPointStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Snapshot, PointStoreError> {
        records::assemble(&self.name, self.points.clone())
    }
}
