//! Image preprocessing: page image file → size-capped PNG → base64.
//!
//! The cap is a hard bound on the longer edge, not a quality heuristic: every
//! page that exceeds it is scaled down uniformly, every page that doesn't is
//! only re-encoded. PNG keeps rendered text lossless. The result is a pure
//! function of the pixels and the cap, so encoding the same page twice yields
//! the same string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// A base64 PNG ready to be embedded in a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard, padded base64 of the PNG bytes.
    pub data: String,
    /// Width after downscaling.
    pub width: u32,
    /// Height after downscaling.
    pub height: u32,
}

/// Load `path`, cap its longer edge at `max_dimension`, and encode as base64 PNG.
pub fn encode_image_file(path: &Path, max_dimension: u32) -> Result<EncodedImage, image::ImageError> {
    let img = image::open(path)?;
    encode_image(&img, max_dimension)
}

/// Cap the longer edge of `img` at `max_dimension` and encode as base64 PNG.
pub fn encode_image(img: &DynamicImage, max_dimension: u32) -> Result<EncodedImage, image::ImageError> {
    let (width, height) = img.dimensions();
    let (target_w, target_h) = bounded_dimensions(width, height, max_dimension);

    let mut buf = Vec::new();
    if (target_w, target_h) == (width, height) {
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    } else {
        debug!("Downscaling {}x{} → {}x{}", width, height, target_w, target_h);
        img.resize_exact(target_w, target_h, FilterType::CatmullRom)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    }

    let data = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", data.len());

    Ok(EncodedImage {
        data,
        width: target_w,
        height: target_h,
    })
}

/// Target size for a `width × height` image under a longer-edge cap.
///
/// Images within the cap are unchanged. Otherwise the longer edge becomes
/// exactly `max_dimension` and the shorter edge is scaled by the same factor,
/// rounded to nearest, never below 1.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = |side: u32| -> u32 {
        let scaled = (u64::from(side) * u64::from(max_dimension) + u64::from(longest) / 2)
            / u64::from(longest);
        (scaled as u32).max(1)
    };
    if width >= height {
        (max_dimension, scale(height))
    } else {
        (scale(width), max_dimension)
    }
}
