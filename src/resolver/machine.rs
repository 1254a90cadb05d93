use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-limited access URL and the key it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUrl {
    pub url: String,
    /// the thumbnail key, or the original path after a fallback
    pub resolved_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to load image {path}: {message}")]
    Unavailable { path: String, message: String },
}

/// One resolution, as a state machine:
///
/// ```text
/// Start ──prefer thumbnail──▶ TryThumb ──found──▶ Found
///   │                            └──missing──▶ TryGenerate ──▶ RetryThumb ──found──▶ Found
///   │                                                             └──missing──▶ TryOriginal
///   └──original only──▶ TryOriginal ──found──▶ Found
///                             └──missing──▶ Failed
/// ```
///
/// `Found` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveState {
    Start,
    TryThumb,
    TryGenerate,
    RetryThumb,
    TryOriginal,
    Found(ResolvedUrl),
    Failed(ResolveError),
}

/// What happened when the action of the current state was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// answer to `Start`
    Begin { prefer_thumbnail: bool },
    /// a lookup produced a URL
    Located(ResolvedUrl),
    /// a lookup failed (missing object or storage error)
    LookupFailed { message: String },
    /// generation finished, successfully or not
    GenerationDone { succeeded: bool },
}

impl ResolveState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResolveState::Found(_) | ResolveState::Failed(_))
    }

    /// Pure transition function. Outcomes that do not apply to the current
    /// state leave it unchanged.
    pub fn advance(self, path: &str, outcome: Outcome) -> ResolveState {
        use Outcome::*;
        use ResolveState::*;

        match (self, outcome) {
            (Start, Begin { prefer_thumbnail: true }) => TryThumb,
            (Start, Begin { prefer_thumbnail: false }) => TryOriginal,

            (TryThumb, Located(url)) => Found(url),
            (TryThumb, LookupFailed { .. }) => TryGenerate,

            // re-check once whatever the generation result
            (TryGenerate, GenerationDone { .. }) => RetryThumb,

            (RetryThumb, Located(url)) => Found(url),
            (RetryThumb, LookupFailed { .. }) => TryOriginal,

            (TryOriginal, Located(url)) => Found(url),
            (TryOriginal, LookupFailed { message }) => Failed(ResolveError::Unavailable {
                path: path.to_string(),
                message,
            }),

            (state, _) => state,
        }
    }
}
