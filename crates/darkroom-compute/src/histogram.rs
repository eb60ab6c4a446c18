//! Channel histograms.
//!
//! 256-bin counts per color channel plus a Rec.709 luma channel, computed
//! from RGBA8 pixels. Histogram read-back completes without an await point,
//! so callers dispatch it through
//! [`execute_sync`](crate::AdaptiveProcessor::execute_sync).

use std::fmt;

use rayon::prelude::*;

use darkroom_core::Error;

use crate::ComputeResult;

// Rec.709 luma weights.
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// 256-bin histograms for each channel plus luma.
#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    /// Red channel bins.
    pub r: [u32; 256],
    /// Green channel bins.
    pub g: [u32; 256],
    /// Blue channel bins.
    pub b: [u32; 256],
    /// Rec.709 luma bins.
    pub luma: [u32; 256],
}

impl Histogram {
    /// All-zero histogram.
    pub fn new() -> Self {
        Self {
            r: [0; 256],
            g: [0; 256],
            b: [0; 256],
            luma: [0; 256],
        }
    }

    /// Adds every count from `other` into `self`.
    pub fn merge(&mut self, other: &Histogram) {
        for i in 0..256 {
            self.r[i] += other.r[i];
            self.g[i] += other.g[i];
            self.b[i] += other.b[i];
            self.luma[i] += other.luma[i];
        }
    }

    /// Total pixels counted.
    pub fn pixel_count(&self) -> u64 {
        self.r.iter().map(|&c| c as u64).sum()
    }

    /// Largest bin count across all four channels.
    pub fn max_bin(&self) -> u32 {
        [&self.r, &self.g, &self.b, &self.luma]
            .iter()
            .flat_map(|bins| bins.iter().copied())
            .max()
            .unwrap_or(0)
    }

    #[inline]
    fn accumulate(&mut self, px: &[u8]) {
        self.r[px[0] as usize] += 1;
        self.g[px[1] as usize] += 1;
        self.b[px[2] as usize] += 1;
        let luma = (LUMA_R * px[0] as f32 + LUMA_G * px[1] as f32 + LUMA_B * px[2] as f32).round();
        self.luma[(luma as usize).min(255)] += 1;
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("pixels", &self.pixel_count())
            .field("max_bin", &self.max_bin())
            .finish()
    }
}

/// Computes channel histograms of an RGBA8 buffer on the CPU.
///
/// # Errors
///
/// [`darkroom_core::Error::MalformedPixelData`] if the buffer is not whole
/// RGBA pixels.
pub fn compute_histogram_cpu(pixels: &[u8]) -> ComputeResult<Histogram> {
    if pixels.len() % 4 != 0 {
        return Err(Error::malformed_pixel_data(pixels.len(), 4).into());
    }

    Ok(pixels
        .par_chunks(4)
        .fold(Histogram::new, |mut h, px| {
            h.accumulate(px);
            h
        })
        .reduce(Histogram::new, |mut a, b| {
            a.merge(&b);
            a
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color() {
        let pixels: Vec<u8> = [10u8, 20, 30, 255].repeat(50);
        let hist = compute_histogram_cpu(&pixels).unwrap();

        assert_eq!(hist.r[10], 50);
        assert_eq!(hist.g[20], 50);
        assert_eq!(hist.b[30], 50);
        assert_eq!(hist.pixel_count(), 50);
        assert_eq!(hist.max_bin(), 50);
    }

    #[test]
    fn test_luma_weights() {
        // White and black land in the extreme bins.
        let hist = compute_histogram_cpu(&[255, 255, 255, 255, 0, 0, 0, 255]).unwrap();
        assert_eq!(hist.luma[255], 1);
        assert_eq!(hist.luma[0], 1);

        // Pure green: 0.7152 * 255 rounds to 182.
        let hist = compute_histogram_cpu(&[0, 255, 0, 255]).unwrap();
        assert_eq!(hist.luma[182], 1);
    }

    #[test]
    fn test_empty_buffer() {
        let hist = compute_histogram_cpu(&[]).unwrap();
        assert_eq!(hist.pixel_count(), 0);
        assert_eq!(hist.max_bin(), 0);
    }

    #[test]
    fn test_malformed_input_rejected() {
        let err = compute_histogram_cpu(&[1, 2, 3]).unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[test]
    fn test_merge_adds_counts() {
        let a = compute_histogram_cpu(&[5, 5, 5, 255]).unwrap();
        let mut b = compute_histogram_cpu(&[5, 5, 5, 255].repeat(3)).unwrap();
        b.merge(&a);

        assert_eq!(b.r[5], 4);
        assert_eq!(b.pixel_count(), 4);
    }
}
