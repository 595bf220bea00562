use std::path::Path;

use image::RgbImage;

use crate::error::{FeedError, Result};

/// Decode a still image file into a packed RGB raster
pub fn decode_file(path: &Path) -> Result<RgbImage> {
    let image = image::open(path).map_err(|source| match source {
        image::ImageError::IoError(source) => FeedError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => FeedError::Decode {
            path: path.to_path_buf(),
            source,
        },
    })?;
    Ok(image.to_rgb8())
}

/// Decode an in-memory PNG/JPEG still into a packed RGB raster
pub fn decode_encoded(data: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(data)?.to_rgb8())
}
