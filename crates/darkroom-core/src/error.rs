//! Error types for darkroom-core operations.
//!
//! This module provides the failure modes shared by every layer of the
//! processing stack: pixel-format conversion, buffer validation against
//! stated dimensions, and dimension validation.
//!
//! # Overview
//!
//! All malformed-input conditions fail fast with a descriptive error rather
//! than silently truncating or padding pixel data. Higher layers (the
//! dispatch engine in `darkroom-compute`) wrap this enum via `#[from]`.
//!
//! # Usage
//!
//! ```rust
//! use darkroom_core::{Error, Result};
//!
//! fn check_rgba_len(len: usize, width: u32, height: u32) -> Result<()> {
//!     let expected = width as usize * height as usize * 4;
//!     if len != expected {
//!         return Err(Error::BufferSizeMismatch {
//!             expected,
//!             actual: len,
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
///
/// Convenience alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating or converting pixel data.
///
/// This enum uses [`thiserror`] for automatic [`std::error::Error`] and
/// [`std::fmt::Display`] implementations.
#[derive(Debug, Error)]
pub enum Error {
    /// Pixel buffer length is not a whole number of pixels.
    ///
    /// Returned by format conversions when the input length is not
    /// divisible by the channel count. The input is never truncated or
    /// zero-padded to fit.
    ///
    /// # Example
    ///
    /// ```rust
    /// use darkroom_core::Error;
    ///
    /// let err = Error::MalformedPixelData { len: 10, channels: 3 };
    /// assert!(err.to_string().contains("10"));
    /// ```
    #[error("pixel buffer of {len} bytes is not a whole number of {channels}-channel pixels")]
    MalformedPixelData {
        /// Buffer length in bytes
        len: usize,
        /// Channels per pixel the operation expected
        channels: u8,
    },

    /// Buffer length disagrees with the stated image dimensions.
    ///
    /// Returned when an operation is handed a pixel buffer whose length
    /// does not match `width * height * channels`.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        /// Bytes implied by the stated dimensions
        expected: usize,
        /// Bytes actually provided
        actual: usize,
    },

    /// Invalid image dimensions.
    ///
    /// Returned when dimensions would overflow buffer size calculations
    /// or otherwise cannot describe a real image.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Reason why dimensions are invalid
        reason: String,
    },
}

impl Error {
    /// Creates an [`Error::MalformedPixelData`] error.
    #[inline]
    pub fn malformed_pixel_data(len: usize, channels: u8) -> Self {
        Self::MalformedPixelData { len, channels }
    }

    /// Creates an [`Error::BufferSizeMismatch`] error.
    #[inline]
    pub fn buffer_size_mismatch(expected: usize, actual: usize) -> Self {
        Self::BufferSizeMismatch { expected, actual }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u32, height: u32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error indicates malformed caller input.
    #[inline]
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MalformedPixelData { .. } | Self::BufferSizeMismatch { .. }
        )
    }
}
