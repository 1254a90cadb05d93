pub mod backfill;
pub mod model;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ThumbError;
use crate::imaging::{render_thumbnail, ThumbnailSpec, THUMBNAIL_CONTENT_TYPE};
use crate::keys;
use crate::storage::{ObjectStore, PutObject};

pub use backfill::run_backfill;
pub use model::{BackfillStats, GenerateOutcome};

/// Thumbnails are immutable once written: a changed source arrives under a new key.
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=31536000";
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Anything that can produce the thumbnail for a source key on demand.
#[async_trait]
pub trait GenerateThumbnail: Send + Sync {
    async fn generate(&self, bucket: &str, source_key: &str)
        -> Result<GenerateOutcome, ThumbError>;
}

/// Turns one source image into one thumbnail stored at the derived key.
///
/// Stateless between calls; safe to invoke concurrently for the same key,
/// since identical input yields identical bytes and the last write wins.
pub struct ThumbnailGenerator {
    store: Arc<dyn ObjectStore>,
    spec: ThumbnailSpec,
    cache_control: String,
    deadline: Duration,
}

impl ThumbnailGenerator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            spec: ThumbnailSpec::default(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_spec(mut self, spec: ThumbnailSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = cache_control.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn spec(&self) -> &ThumbnailSpec {
        &self.spec
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Generate the thumbnail for `source_key` in `bucket`.
    ///
    /// Thumbnail keys are skipped without any I/O. Every failure is returned
    /// to the caller, nothing is retried here, and a partial thumbnail is never
    /// written: the store receives the complete encoded buffer or nothing.
    pub async fn generate(
        &self,
        bucket: &str,
        source_key: &str,
    ) -> Result<GenerateOutcome, ThumbError> {
        if keys::is_thumbnail_key(source_key) {
            tracing::info!("generator: skipping thumbnail key {}", source_key);
            return Ok(GenerateOutcome::Skipped {
                key: source_key.to_string(),
            });
        }

        let thumbnail_key = keys::derive_thumbnail_key(source_key)?;

        match tokio::time::timeout(
            self.deadline,
            self.generate_inner(bucket, source_key, thumbnail_key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "generator: {}/{} exceeded {:?} deadline",
                    bucket,
                    source_key,
                    self.deadline
                );
                Err(ThumbError::DeadlineExceeded {
                    key: source_key.to_string(),
                    seconds: self.deadline.as_secs(),
                })
            }
        }
    }

    async fn generate_inner(
        &self,
        bucket: &str,
        source_key: &str,
        thumbnail_key: String,
    ) -> Result<GenerateOutcome, ThumbError> {
        tracing::info!("generator: processing {}/{}", bucket, source_key);

        let source = self
            .store
            .get_object(bucket, source_key)
            .await
            .map_err(|e| ThumbError::from_fetch(source_key, e))?;
        tracing::debug!("generator: fetched {} bytes for {}", source.len(), source_key);

        // Decode/resize/encode is CPU-bound: keep it off the async workers.
        let spec = self.spec;
        let rendered = tokio::task::spawn_blocking(move || render_thumbnail(&source, &spec))
            .await
            .map_err(|e| ThumbError::Worker {
                key: source_key.to_string(),
                message: e.to_string(),
            })?
            .map_err(|e| ThumbError::from_render(source_key, e))?;

        let thumbnail_size = rendered.bytes.len();
        self.store
            .put_object(
                bucket,
                &thumbnail_key,
                PutObject {
                    body: rendered.bytes,
                    content_type: THUMBNAIL_CONTENT_TYPE.to_string(),
                    cache_control: Some(self.cache_control.clone()),
                },
            )
            .await
            .map_err(|e| ThumbError::StorageWrite {
                key: thumbnail_key.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            "generator: wrote {} ({}x{}, {} bytes)",
            thumbnail_key,
            rendered.width,
            rendered.height,
            thumbnail_size
        );

        Ok(GenerateOutcome::Generated {
            thumbnail_key,
            thumbnail_size,
            width: rendered.width,
            height: rendered.height,
        })
    }
}

#[async_trait]
impl GenerateThumbnail for ThumbnailGenerator {
    async fn generate(
        &self,
        bucket: &str,
        source_key: &str,
    ) -> Result<GenerateOutcome, ThumbError> {
        ThumbnailGenerator::generate(self, bucket, source_key).await
    }
}
