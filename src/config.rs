use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generator::DEFAULT_CACHE_CONTROL;
use crate::imaging::thumbnails::{DEFAULT_MAX_SIZE, DEFAULT_QUALITY};
use crate::imaging::{ResizeFilter, ThumbnailSpec};

/// S3 caps presigned URL lifetime at seven days.
const MAX_URL_TTL_SECS: u64 = 7 * 24 * 3600;

fn default_max_size() -> u32 {
    DEFAULT_MAX_SIZE
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_cache_control() -> String {
    DEFAULT_CACHE_CONTROL.to_string()
}

fn default_url_ttl_secs() -> u64 {
    300
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_deadline_secs() -> u64 {
    30
}

fn default_backfill_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    S3,
    /// S3-compatible server at a custom endpoint (path-style addressing)
    S3Endpoint { endpoint_url: String },
    /// local directory tree, one subdirectory per bucket
    Fs { root: PathBuf },
}

/// Service configuration, read from an optional JSON file and then the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// default bucket when a request names none
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub filter: ResizeFilter,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
    #[serde(default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_backfill_concurrency")]
    pub backfill_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: None,
            storage: StorageConfig::default(),
            max_size: default_max_size(),
            quality: default_quality(),
            filter: ResizeFilter::default(),
            cache_control: default_cache_control(),
            url_ttl_secs: default_url_ttl_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            deadline_secs: default_deadline_secs(),
            backfill_concurrency: default_backfill_concurrency(),
        }
    }
}

impl Config {
    pub fn thumbnail_spec(&self) -> ThumbnailSpec {
        ThumbnailSpec {
            max_size: self.max_size,
            quality: self.quality,
            filter: self.filter,
        }
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.url_ttl_secs)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// The configured bucket, or an error naming the variables that set it.
    pub fn require_bucket(&self) -> Result<&str> {
        match self.bucket.as_deref() {
            Some(b) if !b.is_empty() => Ok(b),
            _ => bail!("no bucket configured (set THUMBS_BUCKET or \"bucket\" in the config file)"),
        }
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bucket) = ["THUMBS_BUCKET", "AMPLIFY_STORAGE_BUCKET_NAME", "STORAGE_BUCKET_NAME"]
            .iter()
            .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        {
            self.bucket = Some(bucket);
        }
        if let Some(v) = lookup("THUMBS_MAX_SIZE") {
            self.max_size = v.parse().context("THUMBS_MAX_SIZE")?;
        }
        if let Some(v) = lookup("THUMBS_QUALITY") {
            self.quality = v.parse().context("THUMBS_QUALITY")?;
        }
        if let Some(v) = lookup("THUMBS_URL_TTL_SECS") {
            self.url_ttl_secs = v.parse().context("THUMBS_URL_TTL_SECS")?;
        }
        if let Some(v) = lookup("THUMBS_DEADLINE_SECS") {
            self.deadline_secs = v.parse().context("THUMBS_DEADLINE_SECS")?;
        }
        if let Some(root) = lookup("THUMBS_STORAGE_ROOT").filter(|v| !v.is_empty()) {
            self.storage = StorageConfig::Fs { root: root.into() };
        } else if let Some(endpoint) = lookup("THUMBS_S3_ENDPOINT").filter(|v| !v.is_empty()) {
            self.storage = StorageConfig::S3Endpoint {
                endpoint_url: endpoint,
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            bail!("max_size must be > 0");
        }
        if !(1..=100).contains(&self.quality) {
            bail!("quality must be within 1..=100, got {}", self.quality);
        }
        if self.url_ttl_secs == 0 || self.url_ttl_secs > MAX_URL_TTL_SECS {
            bail!(
                "url_ttl_secs must be within 1..={}, got {}",
                MAX_URL_TTL_SECS,
                self.url_ttl_secs
            );
        }
        if self.refresh_margin_secs >= self.url_ttl_secs {
            bail!(
                "refresh_margin_secs ({}) must be shorter than url_ttl_secs ({})",
                self.refresh_margin_secs,
                self.url_ttl_secs
            );
        }
        if self.deadline_secs == 0 {
            bail!("deadline_secs must be > 0");
        }
        if self.backfill_concurrency == 0 {
            bail!("backfill_concurrency must be > 0");
        }
        Ok(())
    }
}

/// Read the JSON config at `path`; a missing path yields the defaults.
pub fn read_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// File, then environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = read_config(path)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    tracing::debug!("config: {:?}", config);
    Ok(config)
}
