//! Lossless RGB/RGBA pixel-format conversion.
//!
//! Compute paths work on RGBA byte buffers; sources and sinks are often
//! tightly-packed RGB. These conversions expand and contract between the
//! two without touching color values. Malformed buffer lengths fail fast,
//! never truncate.

use crate::error::{Error, Result};

/// Alpha value written for every pixel when expanding RGB to RGBA.
pub const OPAQUE_ALPHA: u8 = 255;

/// Expands a tightly-packed RGB buffer to RGBA with opaque alpha.
///
/// Output length is exactly `4/3` of the input length. Color bytes are
/// copied verbatim; every fourth output byte is [`OPAQUE_ALPHA`].
///
/// # Errors
///
/// [`Error::MalformedPixelData`] if the input length is not a multiple of 3.
pub fn rgb_to_rgba(rgb: &[u8]) -> Result<Vec<u8>> {
    if rgb.len() % 3 != 0 {
        return Err(Error::malformed_pixel_data(rgb.len(), 3));
    }

    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(px);
        rgba.push(OPAQUE_ALPHA);
    }
    Ok(rgba)
}

/// Contracts an RGBA buffer to tightly-packed RGB, dropping alpha.
///
/// Output length is exactly `3/4` of the input length. Color bytes are
/// copied verbatim regardless of the alpha values present.
///
/// # Errors
///
/// [`Error::MalformedPixelData`] if the input length is not a multiple of 4.
pub fn rgba_to_rgb(rgba: &[u8]) -> Result<Vec<u8>> {
    if rgba.len() % 4 != 0 {
        return Err(Error::malformed_pixel_data(rgba.len(), 4));
    }

    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    Ok(rgb)
}
