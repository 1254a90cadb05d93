use std::io::Cursor;

/// Read the EXIF orientation tag (1..=8) from an encoded image held in memory.
/// Never panics; returns None when the container carries no EXIF block.
pub fn read_orientation(bytes: &[u8]) -> Option<u16> {
    match std::panic::catch_unwind(|| read_orientation_inner(bytes)) {
        Ok(orientation) => orientation,
        Err(_) => {
            tracing::warn!("exif: panic while reading orientation ({} bytes)", bytes.len());
            None
        }
    }
}

fn read_orientation_inner(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(e) => e,
        Err(e) => {
            tracing::trace!("exif: no EXIF block: {}", e);
            return None;
        }
    };
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Short(v) => v.first().copied().filter(|o| (1..=8).contains(o)),
        _ => None,
    }
}

/// Apply an EXIF orientation so the pixels are upright.
pub fn apply_orientation(img: image::DynamicImage, orientation: Option<u16>) -> image::DynamicImage {
    match orientation {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}
