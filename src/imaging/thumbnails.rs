use crate::imaging::exif::{apply_orientation, read_orientation};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SIZE: u32 = 300;
pub const DEFAULT_QUALITY: u8 = 80;

/// Resampling filter used for downscaling. Nearest-neighbour is deliberately
/// absent: it aliases on photographic content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Output geometry and encoding of a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    /// side of the square bounding box, in pixels
    pub max_size: u32,
    /// JPEG quality, 1..=100
    pub quality: u8,
    pub filter: ResizeFilter,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            quality: DEFAULT_QUALITY,
            filter: ResizeFilter::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedThumbnail {
    /// JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// dimensions of the decoded source after orientation
    pub source_width: u32,
    pub source_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("image processing panicked")]
    Panicked,
}

/// Scale `(width, height)` so the longer side equals `max_size`, keeping the
/// aspect ratio. The shorter side is rounded and never drops below 1 px.
pub fn fit_within(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let scale_short = |short: u32, long: u32| -> u32 {
        let scaled = (short as f64 * max_size as f64 / long as f64).round() as u32;
        scaled.max(1).min(max_size)
    };
    if width >= height {
        (max_size, scale_short(height, width.max(1)))
    } else {
        (scale_short(width, height), max_size)
    }
}

/// Decode `bytes`, orient, resize to fit `spec.max_size` and encode as JPEG.
///
/// Never panics: a panic inside a decoder is reported as [`RenderError::Panicked`].
pub fn render_thumbnail(
    bytes: &[u8],
    spec: &ThumbnailSpec,
) -> Result<RenderedThumbnail, RenderError> {
    match std::panic::catch_unwind(|| render_thumbnail_inner(bytes, spec)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("thumbnail: panic while rendering {} bytes", bytes.len());
            Err(RenderError::Panicked)
        }
    }
}

fn render_thumbnail_inner(
    bytes: &[u8],
    spec: &ThumbnailSpec,
) -> Result<RenderedThumbnail, RenderError> {
    let img = image::load_from_memory(bytes).map_err(|e| {
        tracing::debug!("thumbnail: cannot decode {} bytes: {}", bytes.len(), e);
        RenderError::Decode(e.to_string())
    })?;

    let orientation = read_orientation(bytes);
    let img = apply_orientation(img, orientation);
    let (source_width, source_height) = (img.width(), img.height());

    let (width, height) = fit_within(source_width, source_height, spec.max_size);
    let resized = img.resize_exact(width, height, spec.filter.filter_type());
    let rgb = flatten_onto_white(resized);

    let mut buf: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, spec.quality)
        .encode_image(&rgb)
        .map_err(|e| RenderError::Encode(e.to_string()))?;

    tracing::debug!(
        "thumbnail: {}x{} (orientation {:?}) -> {}x{}, {} bytes",
        source_width,
        source_height,
        orientation,
        width,
        height,
        buf.len()
    );

    Ok(RenderedThumbnail {
        bytes: buf,
        width,
        height,
        source_width,
        source_height,
    })
}

/// JPEG has no alpha channel: composite transparent pixels over white.
fn flatten_onto_white(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}
