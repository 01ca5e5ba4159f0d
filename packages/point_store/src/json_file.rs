//! Point store backed by a JSON file on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use watermap_point_models::Snapshot;

use crate::{PointStore, PointStoreError, records};

/// Reads a JSON array of point records from a file.
pub struct JsonFilePointStore {
    name: String,
    path: PathBuf,
    generate_ids: bool,
}

impl JsonFilePointStore {
    /// Creates a store reading from `path`.
    #[must_use]
    pub fn new(name: &str, path: impl AsRef<Path>, generate_ids: bool) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            generate_ids,
        }
    }
}

#[async_trait]
impl PointStore for JsonFilePointStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Snapshot, PointStoreError> {
        log::info!("Reading {} points from {}", self.name, self.path.display());

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            PointStoreError::unavailable(&self.name, format!("{}: {e}", self.path.display()))
        })?;

        let values = records::parse_payload(&self.name, &bytes)?;
        let points = records::points_from_json(&self.name, values, self.generate_ids)?;
        records::assemble(&self.name, points)
    }
}
