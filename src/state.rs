use std::sync::Arc;

use crate::config::{Config, StorageConfig};
use crate::generator::ThumbnailGenerator;
use crate::resolver::Resolver;
use crate::storage::{FsStore, ObjectStore, S3Store};

/// Everything a request handler needs, built once per process.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub generator: Arc<ThumbnailGenerator>,
    pub resolver: Resolver,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ObjectStore>) -> Self {
        let generator = Arc::new(
            ThumbnailGenerator::new(store.clone())
                .with_spec(config.thumbnail_spec())
                .with_cache_control(config.cache_control.clone())
                .with_deadline(config.deadline()),
        );
        let resolver = Resolver::new(
            store.clone(),
            generator.clone(),
            config.bucket.clone().unwrap_or_default(),
        )
        .with_url_ttl(config.url_ttl())
        .with_refresh_margin(config.refresh_margin());

        Self {
            config,
            store,
            generator,
            resolver,
        }
    }

    /// Build the store selected by the config, then the state around it.
    pub async fn from_config(config: Config) -> Self {
        let store: Arc<dyn ObjectStore> = match &config.storage {
            StorageConfig::S3 => Arc::new(S3Store::from_env().await),
            StorageConfig::S3Endpoint { endpoint_url } => {
                Arc::new(S3Store::with_endpoint(endpoint_url).await)
            }
            StorageConfig::Fs { root } => Arc::new(FsStore::new(root)),
        };
        tracing::info!("state: storage backend {:?}", config.storage);
        Self::new(config, store)
    }

    /// The bucket named by a request, else the configured default.
    pub fn bucket_for<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested
            .filter(|b| !b.is_empty())
            .or(self.config.bucket.as_deref())
            .filter(|b| !b.is_empty())
    }
}
