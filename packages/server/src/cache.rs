//! Build-once cache of the serving index.
//!
//! Readers take an `Arc` to the current [`IndexGeneration`] and keep using
//! it for as long as they like. A reload builds a complete new generation
//! off to the side and publishes it by swapping the pointer, so no reader
//! ever sees a partially built index.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use watermap_cluster::{ClusterIndex, ClusterOptions};
use watermap_point_models::{Point, Snapshot};
use watermap_point_store::{PointStore, PointStoreError};

use crate::config::ServiceConfig;
use crate::error::ServiceError;

/// One fully built index together with the snapshots it serves.
pub struct IndexGeneration {
    index: ClusterIndex,
    places: Option<Arc<Snapshot>>,
    built_at: DateTime<Utc>,
}

impl IndexGeneration {
    /// The cluster index over the entity snapshot.
    #[must_use]
    pub const fn index(&self) -> &ClusterIndex {
        &self.index
    }

    /// The entity snapshot.
    #[must_use]
    pub const fn entities(&self) -> &Arc<Snapshot> {
        self.index.snapshot()
    }

    /// The place snapshot, if a place source is configured.
    #[must_use]
    pub const fn places(&self) -> Option<&Arc<Snapshot>> {
        self.places.as_ref()
    }

    /// Place points, empty without a place source.
    #[must_use]
    pub fn place_points(&self) -> &[Point] {
        match &self.places {
            Some(snapshot) => snapshot.points(),
            None => &[],
        }
    }

    /// Generation number: the entity snapshot version.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.index.version().value()
    }

    #[must_use]
    pub const fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

/// Owns the point stores and the currently published generation.
pub struct IndexCache {
    entities: Arc<dyn PointStore>,
    places: Option<Arc<dyn PointStore>>,
    options: ClusterOptions,
    current: RwLock<Option<Arc<IndexGeneration>>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl IndexCache {
    #[must_use]
    pub fn new(
        entities: Arc<dyn PointStore>,
        places: Option<Arc<dyn PointStore>>,
        options: ClusterOptions,
    ) -> Self {
        Self {
            entities,
            places,
            options,
            current: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Opens the stores named in `config`. Nothing is loaded yet.
    ///
    /// # Errors
    ///
    /// Returns [`PointStoreError::InvalidConfig`] if a source is unusable.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, PointStoreError> {
        let entities = watermap_point_store::open("entities", &config.entities)?;
        let places = config
            .places
            .as_ref()
            .map(|places| watermap_point_store::open("places", places))
            .transpose()?;
        Ok(Self::new(entities, places, config.cluster.clone()))
    }

    /// The published generation, if any build has succeeded.
    #[must_use]
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the published generation, building it first if none exists.
    ///
    /// Concurrent callers wait for a single build. A failed build is not
    /// remembered; the next call tries again from a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns the load or build failure.
    pub async fn get_or_build(&self) -> Result<Arc<IndexGeneration>, ServiceError> {
        if let Some(generation) = self.current() {
            return Ok(generation);
        }

        let _guard = self.build_lock.lock().await;
        if let Some(generation) = self.current() {
            return Ok(generation);
        }

        let generation = Arc::new(self.build().await?);
        self.publish(Arc::clone(&generation));
        Ok(generation)
    }

    /// Builds a fresh generation and publishes it. The previous generation
    /// keeps serving until the swap, and stays published if the build fails.
    ///
    /// # Errors
    ///
    /// Returns the load or build failure.
    pub async fn reload(&self) -> Result<Arc<IndexGeneration>, ServiceError> {
        let _guard = self.build_lock.lock().await;
        let generation = Arc::new(self.build().await?);
        self.publish(Arc::clone(&generation));
        Ok(generation)
    }

    fn publish(&self, generation: Arc<IndexGeneration>) {
        log::info!(
            "Publishing index generation {} ({} points, {} places)",
            generation.generation(),
            generation.entities().len(),
            generation.place_points().len()
        );
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(generation);
    }

    async fn build(&self) -> Result<IndexGeneration, ServiceError> {
        let start = Instant::now();

        log::info!("Loading entities from '{}'...", self.entities.name());
        let entities = Arc::new(self.entities.load().await?);

        let places = match &self.places {
            Some(store) => {
                log::info!("Loading places from '{}'...", store.name());
                Some(Arc::new(store.load().await?))
            }
            None => None,
        };

        let options = self.options.clone();
        let index = tokio::task::spawn_blocking(move || ClusterIndex::build(entities, options))
            .await
            .map_err(|e| ServiceError::IndexBuild(e.to_string()))??;

        log::info!(
            "Index generation {} ready in {:.2?}",
            index.version(),
            start.elapsed()
        );

        Ok(IndexGeneration {
            index,
            places,
            built_at: Utc::now(),
        })
    }
}
