//! Catalog handle shared across request handlers

use std::sync::Arc;

use tracing::info;

use crate::aggregate::Aggregator;
use crate::config::CatalogConfig;
use crate::dashboard::Dashboards;
use crate::db::{self, MonitorHandle, PoolState, QueryExecutor, StatsSnapshot};
use crate::error::Result;
use crate::rental::RentalAllocator;
use crate::repos::{FavoriteRepo, FeatureRepo, ImageRepo, PropertyRepo, UserRepo, VisitRepo};

/// Entry point to the catalog. Cheap to clone; all clones share one pool.
#[derive(Debug, Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

#[derive(Debug)]
struct CatalogInner {
    config: CatalogConfig,
    exec: QueryExecutor,
}

impl Catalog {
    /// Validate `config`, build the pool and apply the schema.
    pub async fn open(config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let exec = QueryExecutor::from_config(&config)?;
        db::schema::apply(&exec).await?;
        info!(
            database_url = %config.database_url,
            max_size = config.pool.max_size,
            queue_limit = config.pool.queue_limit,
            "catalog opened"
        );
        Ok(Self {
            inner: Arc::new(CatalogInner { config, exec }),
        })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.inner.config
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.inner.exec
    }

    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(&self.inner.exec)
    }

    pub fn properties(&self) -> PropertyRepo<'_> {
        PropertyRepo::new(&self.inner.exec)
    }

    pub fn images(&self) -> ImageRepo<'_> {
        ImageRepo::new(&self.inner.exec)
    }

    pub fn features(&self) -> FeatureRepo<'_> {
        FeatureRepo::new(&self.inner.exec)
    }

    pub fn favorites(&self) -> FavoriteRepo<'_> {
        FavoriteRepo::new(&self.inner.exec)
    }

    pub fn visits(&self) -> VisitRepo<'_> {
        VisitRepo::new(&self.inner.exec)
    }

    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.inner.exec)
    }

    pub fn rentals(&self) -> RentalAllocator<'_> {
        RentalAllocator::new(&self.inner.exec)
    }

    pub fn dashboards(&self) -> Dashboards<'_> {
        Dashboards::new(&self.inner.exec)
    }

    pub fn pool_state(&self) -> PoolState {
        self.inner.exec.pool_state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.exec.stats()
    }

    /// Start the pool monitor if it is enabled in the configuration.
    pub fn spawn_monitor(&self) -> Option<MonitorHandle> {
        let monitor = &self.inner.config.monitor;
        monitor
            .enabled
            .then(|| db::spawn_monitor(self.inner.exec.pool().clone(), monitor))
    }

    /// Close the pool. Further calls fail with `Closed`.
    pub async fn close(&self) {
        self.inner.exec.close().await;
        info!("catalog closed");
    }
}
