//! Derivative Resolver: turn a logical image path into a short-lived URL,
//! preferring the thumbnail and degrading to the original.

pub mod cache;
pub mod machine;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::generator::GenerateThumbnail;
use crate::keys;
use crate::storage::ObjectStore;

pub use cache::{UrlCache, Variant};
pub use machine::{Outcome, ResolveError, ResolveState, ResolvedUrl};

/// Signed URLs are meant to be re-requested, not kept: minutes, not hours.
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub struct Resolver {
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn GenerateThumbnail>,
    bucket: String,
    url_ttl: Duration,
    cache: UrlCache,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        generator: Arc<dyn GenerateThumbnail>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            bucket: bucket.into(),
            url_ttl: DEFAULT_URL_TTL,
            cache: UrlCache::new(DEFAULT_REFRESH_MARGIN),
        }
    }

    pub fn with_url_ttl(mut self, url_ttl: Duration) -> Self {
        self.url_ttl = url_ttl;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.cache = UrlCache::new(margin);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    /// Resolve `path` to a signed URL. With `prefer_thumbnail`, the thumbnail
    /// is tried first, generated on a miss and re-checked once; if it is still
    /// unavailable the original is resolved instead. Only a missing original
    /// is an error.
    pub async fn resolve(
        &self,
        path: &str,
        prefer_thumbnail: bool,
    ) -> Result<ResolvedUrl, ResolveError> {
        let variant = Variant::for_preference(prefer_thumbnail);
        if let Some(hit) = self.cache.get(path, variant) {
            tracing::debug!("resolver: cache hit for {} ({:?})", path, variant);
            return Ok(hit);
        }

        // Thumbnail paths and paths without a derivable key are served as-is.
        let thumb_key = if prefer_thumbnail && !keys::is_thumbnail_key(path) {
            match keys::derive_thumbnail_key(path) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!("resolver: {}; resolving original", e);
                    None
                }
            }
        } else {
            None
        };

        let mut state = ResolveState::Start.advance(
            path,
            Outcome::Begin {
                prefer_thumbnail: thumb_key.is_some(),
            },
        );

        loop {
            let outcome = match &state {
                ResolveState::Found(resolved) => {
                    // fallbacks are not cached so the next view retries the thumbnail
                    let fell_back = thumb_key
                        .as_deref()
                        .is_some_and(|key| key != resolved.resolved_key);
                    if !fell_back {
                        self.cache.insert(path, variant, resolved.clone());
                    }
                    return Ok(resolved.clone());
                }
                ResolveState::Failed(err) => {
                    tracing::warn!("resolver: {}", err);
                    return Err(err.clone());
                }
                ResolveState::TryThumb | ResolveState::RetryThumb => match &thumb_key {
                    Some(key) => self.locate(key).await,
                    None => Outcome::LookupFailed {
                        message: "no thumbnail key".to_string(),
                    },
                },
                ResolveState::TryGenerate => {
                    tracing::info!("resolver: thumbnail missing for {}, generating", path);
                    let succeeded = match self.generator.generate(&self.bucket, path).await {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::warn!("resolver: generation failed for {}: {}", path, e);
                            false
                        }
                    };
                    Outcome::GenerationDone { succeeded }
                }
                ResolveState::TryOriginal => self.locate(path).await,
                ResolveState::Start => Outcome::Begin {
                    prefer_thumbnail: thumb_key.is_some(),
                },
            };
            state = state.advance(path, outcome);
        }
    }

    /// Signal that the content behind `path` changed; cached URLs for it are dropped.
    pub fn content_changed(&self, path: &str) {
        let removed = self.cache.invalidate(path);
        tracing::debug!("resolver: invalidated {} cached URL(s) for {}", removed, path);
    }

    async fn locate(&self, key: &str) -> Outcome {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.url_ttl).unwrap_or(chrono::Duration::zero());
        match self
            .store
            .presign_existing(&self.bucket, key, self.url_ttl)
            .await
        {
            Ok(url) => Outcome::Located(ResolvedUrl {
                url,
                resolved_key: key.to_string(),
                expires_at,
            }),
            Err(e) => {
                tracing::debug!("resolver: lookup of {} failed: {}", key, e);
                Outcome::LookupFailed {
                    message: e.to_string(),
                }
            }
        }
    }
}
