pub mod exif;
pub mod formats;
pub mod thumbnails;

pub use thumbnails::{
    fit_within, render_thumbnail, RenderError, RenderedThumbnail, ResizeFilter, ThumbnailSpec,
};

/// Media type of every rendered thumbnail, whatever the source format.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";
