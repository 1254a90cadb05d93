const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// Whether a key names an image this service can decode, by extension
/// (case-insensitive). Keys without an extension are not images.
pub fn is_supported_image_key(key: &str) -> bool {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() {
        return false;
    }
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}
