//! Point store backed by a `DuckDB` table.
//!
//! The table must expose `id`, `name`, `latitude`, `longitude` and
//! `description` columns. Ids of any type are read as text and numeric
//! coordinates (including `DECIMAL`) as `f64`. The database is opened
//! read-only for each load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use watermap_point_models::{Point, Snapshot};

use crate::{PointStore, PointStoreError, records};

/// Reads points from a `DuckDB` table.
pub struct DuckDbPointStore {
    name: String,
    path: PathBuf,
    table: String,
}

impl DuckDbPointStore {
    /// Creates a store reading `table` from the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PointStoreError::InvalidConfig`] if `table` is not a plain
    /// (optionally schema-qualified) identifier.
    pub fn new(name: &str, path: impl AsRef<Path>, table: &str) -> Result<Self, PointStoreError> {
        if !is_plain_identifier(table) {
            return Err(PointStoreError::InvalidConfig {
                message: format!("'{table}' is not a valid table name"),
            });
        }

        Ok(Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            table: table.to_string(),
        })
    }
}

fn is_plain_identifier(table: &str) -> bool {
    !table.is_empty()
        && table.split('.').all(|part| {
            part.chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[async_trait]
impl PointStore for DuckDbPointStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Snapshot, PointStoreError> {
        let name = self.name.clone();
        let path = self.path.clone();
        let query = format!(
            "SELECT CAST(id AS VARCHAR), name, CAST(latitude AS DOUBLE), \
             CAST(longitude AS DOUBLE), description FROM {}",
            self.table
        );

        log::info!("Reading {name} points from {} ({})", path.display(), self.table);

        let points = tokio::task::spawn_blocking(move || read_points(&name, &path, &query))
            .await
            .map_err(|e| PointStoreError::unavailable(&self.name, e))??;

        records::assemble(&self.name, points)
    }
}

fn read_points(name: &str, path: &Path, query: &str) -> Result<Vec<Point>, PointStoreError> {
    let unavailable = |e: duckdb::Error| PointStoreError::unavailable(name, e);

    let config = duckdb::Config::default()
        .access_mode(duckdb::AccessMode::ReadOnly)
        .map_err(unavailable)?;
    let conn = duckdb::Connection::open_with_flags(path, config).map_err(unavailable)?;
    let mut stmt = conn.prepare(query).map_err(unavailable)?;
    let mut rows = stmt.query([]).map_err(unavailable)?;

    let mut points = Vec::new();
    while let Some(row) = rows.next().map_err(unavailable)? {
        let record = points.len();
        let schema = |message: &str| PointStoreError::Schema {
            store: name.to_string(),
            record,
            message: message.to_string(),
        };

        let id: Option<String> = row.get(0).map_err(unavailable)?;
        let label: Option<String> = row.get(1).map_err(unavailable)?;
        let latitude: Option<f64> = row.get(2).map_err(unavailable)?;
        let longitude: Option<f64> = row.get(3).map_err(unavailable)?;
        let description: Option<String> = row.get(4).map_err(unavailable)?;

        let id = id.ok_or_else(|| schema("missing required column 'id'"))?;
        let label = label
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| schema("missing required column 'name'"))?;
        let latitude = latitude.ok_or_else(|| schema("missing required column 'latitude'"))?;
        let longitude = longitude.ok_or_else(|| schema("missing required column 'longitude'"))?;

        let mut point = Point::new(id, label, longitude, latitude);
        point.description = description;
        points.push(point);
    }

    Ok(points)
}
