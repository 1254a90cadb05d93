/// Marker inserted between the file stem and the extension of a derivative key.
pub const THUMBNAIL_MARKER: &str = "_thumb";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("malformed object key {key:?}: {reason}")]
    Malformed { key: String, reason: &'static str },
}

/// Split a key into `(stem, extension)` at the final `.` of its last path segment.
///
/// The stem keeps every directory component, so `a.b/c.d.jpg` splits into
/// `("a.b/c.d", "jpg")`.
fn split_extension(key: &str) -> Result<(&str, &str), KeyError> {
    let malformed = |reason| KeyError::Malformed {
        key: key.to_string(),
        reason,
    };

    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    let file_name = &key[name_start..];
    let dot = file_name
        .rfind('.')
        .ok_or_else(|| malformed("no extension segment"))?;

    if dot == 0 {
        return Err(malformed("empty file stem"));
    }
    if dot + 1 == file_name.len() {
        return Err(malformed("empty extension"));
    }

    let split_at = name_start + dot;
    Ok((&key[..split_at], &key[split_at + 1..]))
}

/// Map a source key to its thumbnail key: `<stem>_thumb.<extension>`.
///
/// The extension is kept as-is even though the thumbnail bytes are always JPEG.
/// A key that is already a thumbnail key derives again (`a_thumb.jpg` becomes
/// `a_thumb_thumb.jpg`); callers guard with [`is_thumbnail_key`].
pub fn derive_thumbnail_key(source_key: &str) -> Result<String, KeyError> {
    let (stem, ext) = split_extension(source_key)?;
    Ok(format!("{}{}.{}", stem, THUMBNAIL_MARKER, ext))
}

/// Returns true iff the key's stem carries the thumbnail marker.
pub fn is_thumbnail_key(key: &str) -> bool {
    split_extension(key)
        .map(|(stem, _)| stem.ends_with(THUMBNAIL_MARKER))
        .unwrap_or(false)
}

/// Recover the source key a thumbnail key was derived from.
///
/// Returns None for keys that are not thumbnail keys.
pub fn source_key_for(thumbnail_key: &str) -> Option<String> {
    let (stem, ext) = split_extension(thumbnail_key).ok()?;
    let source_stem = stem.strip_suffix(THUMBNAIL_MARKER)?;
    if source_stem.is_empty() || source_stem.ends_with('/') {
        return None;
    }
    Some(format!("{}.{}", source_stem, ext))
}
