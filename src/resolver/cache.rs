use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::resolver::machine::ResolvedUrl;

/// Which rendition of a path an entry was resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Thumbnail,
    Original,
}

impl Variant {
    pub fn for_preference(prefer_thumbnail: bool) -> Self {
        if prefer_thumbnail {
            Variant::Thumbnail
        } else {
            Variant::Original
        }
    }
}

/// Resolved URLs keyed by `(path, variant)`.
///
/// An entry stops being served `refresh_margin` before its URL expires, so
/// callers never receive a URL that is about to lapse. A content-changed
/// signal drops every entry for the path.
#[derive(Debug)]
pub struct UrlCache {
    entries: Mutex<HashMap<(String, Variant), ResolvedUrl>>,
    refresh_margin: Duration,
}

impl UrlCache {
    pub fn new(refresh_margin: std::time::Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            refresh_margin: Duration::from_std(refresh_margin).unwrap_or(Duration::zero()),
        }
    }

    pub fn get(&self, path: &str, variant: Variant) -> Option<ResolvedUrl> {
        self.get_at(path, variant, Utc::now())
    }

    pub fn get_at(&self, path: &str, variant: Variant, now: DateTime<Utc>) -> Option<ResolvedUrl> {
        let mut entries = self.lock();
        let key = (path.to_string(), variant);
        match entries.get(&key) {
            Some(entry) if entry.expires_at - self.refresh_margin > now => Some(entry.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, path: &str, variant: Variant, resolved: ResolvedUrl) {
        self.insert_at(path, variant, resolved, Utc::now());
    }

    /// Insert and drop every entry already stale at `now`.
    pub fn insert_at(
        &self,
        path: &str,
        variant: Variant,
        resolved: ResolvedUrl,
        now: DateTime<Utc>,
    ) {
        let margin = self.refresh_margin;
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.expires_at - margin > now);
        entries.insert((path.to_string(), variant), resolved);
    }

    /// Drop both renditions of `path`. Returns how many entries were removed.
    pub fn invalidate(&self, path: &str) -> usize {
        let mut entries = self.lock();
        [Variant::Thumbnail, Variant::Original]
            .into_iter()
            .filter(|v| entries.remove(&(path.to_string(), *v)).is_some())
            .count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, Variant), ResolvedUrl>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
