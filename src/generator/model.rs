use serde::{Deserialize, Serialize};

/// Result of one generation call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GenerateOutcome {
    #[serde(rename_all = "camelCase")]
    Generated {
        thumbnail_key: String,
        /// encoded JPEG size in bytes
        thumbnail_size: usize,
        width: u32,
        height: u32,
    },
    /// The source key already denotes a thumbnail; nothing was read or written.
    Skipped { key: String },
}

impl GenerateOutcome {
    pub fn thumbnail_key(&self) -> Option<&str> {
        match self {
            GenerateOutcome::Generated { thumbnail_key, .. } => Some(thumbnail_key),
            GenerateOutcome::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillStats {
    pub total_objects_scanned: usize,
    pub generated: usize,
    pub skipped_existing: usize,
    pub skipped_thumbnails: usize,
    pub skipped_unsupported: usize,
    pub errors: usize,
    /// capped at 100 entries
    pub error_log: Vec<String>,
}
