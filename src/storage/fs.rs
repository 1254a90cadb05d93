use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{ObjectInfo, ObjectStore, PutObject, StorageError};

const META_DIR: &str = ".meta";
const TMP_MARKER: &str = ".partial-";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Headers stored next to each object, since a plain file has none.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    cache_control: Option<String>,
}

/// Local directory store: `<root>/<bucket>/<key>`, headers in
/// `<root>/.meta/<bucket>/<key>.json`.
///
/// Meant for local development and tests; URLs are `file://` URLs with an
/// informational `expires` parameter.
pub struct FsStore {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl FsStore {
    /// A relative `root` is resolved against the working directory, so
    /// URLs always carry an absolute path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a bucket/key pair to a path under the root, rejecting anything
    /// that would escape it.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked(bucket)?).join(checked(key)?))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self
            .root
            .join(META_DIR)
            .join(checked(bucket)?)
            .join(format!("{}.json", checked(key)?.display())))
    }

    /// Write `data` to a sibling temp file and rename it over `path`.
    async fn write_atomic(&self, key: &str, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let write_err = |e: std::io::Error| StorageError::Write {
            key: key.to_string(),
            message: format!("{}: {}", path.display(), e),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_file_name(format!(
            ".{}{}{}-{}",
            file_name,
            TMP_MARKER,
            std::process::id(),
            seq
        ));

        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        Ok(())
    }

    async fn read_sidecar(&self, bucket: &str, key: &str) -> Sidecar {
        let Ok(path) = self.sidecar_path(bucket, key) else {
            return Sidecar::default();
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!("fs: unreadable sidecar {:?}: {}", path, e);
                Sidecar::default()
            }),
            Err(_) => Sidecar::default(),
        }
    }
}

fn checked(part: &str) -> Result<&Path, StorageError> {
    let path = Path::new(part);
    let ok = !part.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        && path.components().next() != Some(Component::Normal(OsStr::new(META_DIR)));
    if ok {
        Ok(path)
    } else {
        Err(StorageError::Backend {
            key: part.to_string(),
            message: "key is not a relative path".to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Backend {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        object: PutObject,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        let sidecar = Sidecar {
            content_type: Some(object.content_type),
            cache_control: object.cache_control,
        };
        let sidecar_bytes = serde_json::to_vec(&sidecar).map_err(|e| StorageError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        self.write_atomic(key, &self.sidecar_path(bucket, key)?, &sidecar_bytes)
            .await?;
        self.write_atomic(key, &path, &object.body).await?;
        tracing::debug!("fs: wrote {} bytes to {:?}", object.body.len(), path);
        Ok(())
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectInfo>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                let sidecar = self.read_sidecar(bucket, key).await;
                Ok(Some(ObjectInfo {
                    key: key.to_string(),
                    size: meta.len(),
                    content_type: sidecar.content_type,
                    cache_control: sidecar.cache_control,
                }))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Backend {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let path = self.object_path(bucket, key)?;
        let expires_in = chrono::Duration::from_std(expires_in).map_err(|e| {
            StorageError::Presign {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        let expires_at = chrono::Utc::now() + expires_in;

        let encoded: Vec<String> = path
            .to_string_lossy()
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        Ok(format!(
            "file://{}?expires={}",
            encoded.join("/"),
            expires_at.timestamp()
        ))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let bucket_dir = self.root.join(checked(bucket)?);
        let prefix = prefix.to_string();

        let (objects, errors) = tokio::task::spawn_blocking(move || {
            scan_bucket(&bucket_dir, &prefix)
        })
        .await
        .map_err(|e| StorageError::Backend {
            key: bucket.to_string(),
            message: e.to_string(),
        })?;

        for e in errors {
            tracing::warn!("fs: {}", e);
        }
        Ok(objects)
    }
}

/// Walk a bucket directory and collect objects under `prefix`.
/// Symlinks and in-flight temp files are skipped. Returns (objects, error_log).
fn scan_bucket(bucket_dir: &Path, prefix: &str) -> (Vec<ObjectInfo>, Vec<String>) {
    let mut objects = Vec::new();
    let mut errors = Vec::new();
    if !bucket_dir.exists() {
        return (objects, errors);
    }

    for entry in WalkDir::new(bucket_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.path_is_symlink())
    {
        match entry {
            Err(e) => errors.push(format!("scan error: {}", e)),
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.file_name().to_string_lossy().contains(TMP_MARKER) {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(bucket_dir) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !key.starts_with(prefix) {
                    continue;
                }
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                objects.push(ObjectInfo {
                    key,
                    size,
                    content_type: None,
                    cache_control: None,
                });
            }
        }
    }
    (objects, errors)
}
