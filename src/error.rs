use crate::imaging::RenderError;
use crate::keys::KeyError;
use crate::storage::StorageError;

/// Failure of a single thumbnail generation.
///
/// Every variant is reported to the caller; none of them is fatal to the
/// process handling other images.
#[derive(Debug, thiserror::Error)]
pub enum ThumbError {
    #[error(transparent)]
    MalformedKey(#[from] KeyError),

    #[error("source object not found: {key}")]
    SourceNotFound { key: String },

    #[error("cannot read source {key}: {message}")]
    SourceRead { key: String, message: String },

    #[error("cannot decode {key}: {message}")]
    Decode { key: String, message: String },

    #[error("cannot encode thumbnail for {key}: {message}")]
    Encode { key: String, message: String },

    #[error("cannot write thumbnail {key}: {message}")]
    StorageWrite { key: String, message: String },

    #[error("thumbnail generation for {key} exceeded the {seconds}s deadline")]
    DeadlineExceeded { key: String, seconds: u64 },

    #[error("thumbnail worker for {key} failed: {message}")]
    Worker { key: String, message: String },
}

impl ThumbError {
    /// Whether a caller-level retry (e.g. a platform function retry) can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ThumbError::SourceRead { .. }
                | ThumbError::StorageWrite { .. }
                | ThumbError::DeadlineExceeded { .. }
                | ThumbError::Worker { .. }
        )
    }

    pub(crate) fn from_fetch(key: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => ThumbError::SourceNotFound {
                key: key.to_string(),
            },
            other => ThumbError::SourceRead {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub(crate) fn from_render(key: &str, err: RenderError) -> Self {
        match err {
            RenderError::Encode(message) => ThumbError::Encode {
                key: key.to_string(),
                message,
            },
            other => ThumbError::Decode {
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }
}
