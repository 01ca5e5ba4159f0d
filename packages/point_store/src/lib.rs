#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point store adapters.
//!
//! Each backing source implements the [`PointStore`] trait to load the
//! full set of named, geolocated entities into an immutable [`Snapshot`].
//! Loads are atomic: a single malformed record rejects the whole load so
//! callers never see a partial snapshot.

pub mod duckdb_store;
pub mod http;
pub mod json_file;
pub mod memory;
pub mod records;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use async_trait::async_trait;
use watermap_point_models::{Snapshot, SnapshotVersion, SourceConfig};

pub use duckdb_store::DuckDbPointStore;
pub use http::HttpPointStore;
pub use json_file::JsonFilePointStore;
pub use memory::MemoryPointStore;

/// Errors that can occur while loading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PointStoreError {
    /// The backing file, database or endpoint could not be read, or its
    /// payload could not be decoded at all.
    #[error("Point source '{store}' unavailable: {message}")]
    SourceUnavailable {
        /// Name of the store that failed.
        store: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A record is missing a required field or carries an invalid value.
    #[error("Schema error in '{store}' record {record}: {message}")]
    Schema {
        /// Name of the store that produced the record.
        store: String,
        /// Zero-based position of the offending record.
        record: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// The store configuration itself is unusable.
    #[error("Invalid point source configuration: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },
}

impl PointStoreError {
    pub(crate) fn unavailable(store: &str, message: impl ToString) -> Self {
        Self::SourceUnavailable {
            store: store.to_string(),
            message: message.to_string(),
        }
    }

    /// Returns `true` if retrying the load later could succeed without the
    /// source data being fixed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

/// A source of point snapshots.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Loads every record from the source into a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PointStoreError::SourceUnavailable`] if the source cannot
    /// be read, or [`PointStoreError::Schema`] if any record is malformed.
    async fn load(&self) -> Result<Snapshot, PointStoreError>;
}

static VERSION_SEED: OnceLock<u64> = OnceLock::new();
static VERSIONS_ISSUED: AtomicU64 = AtomicU64::new(0);

/// First snapshot version of a process started at `started`: its Unix
/// time in microseconds. A restarted process does not hand out the
/// versions, and so the cluster id generations, of the one before it.
#[must_use]
pub fn version_seed(started: DateTime<Utc>) -> u64 {
    u64::try_from(started.timestamp_micros()).unwrap_or(0)
}

/// Allocates the next snapshot version. Versions are unique and strictly
/// increasing for the lifetime of the process, starting from
/// [`version_seed`] of the first call.
#[must_use]
pub fn next_version() -> SnapshotVersion {
    let seed = *VERSION_SEED.get_or_init(|| {
        let seed = version_seed(Utc::now());
        log::debug!("Snapshot versions start at {seed}");
        seed
    });
    SnapshotVersion(seed + VERSIONS_ISSUED.fetch_add(1, Ordering::Relaxed))
}

/// Builds the store described by `config`.
///
/// `name` labels the store in logs (e.g. `"entities"`).
///
/// # Errors
///
/// Returns [`PointStoreError::InvalidConfig`] if the configuration cannot
/// describe a usable store (e.g. an unsafe `DuckDB` table name).
pub fn open(name: &str, config: &SourceConfig) -> Result<Arc<dyn PointStore>, PointStoreError> {
    let store: Arc<dyn PointStore> = match config {
        SourceConfig::JsonFile { path, generate_ids } => {
            Arc::new(JsonFilePointStore::new(name, path, *generate_ids))
        }
        SourceConfig::Duckdb { path, table } => Arc::new(DuckDbPointStore::new(name, path, table)?),
        SourceConfig::Http { url, timeout_secs } => {
            Arc::new(HttpPointStore::new(name, url, *timeout_secs)?)
        }
    };
    Ok(store)
}
