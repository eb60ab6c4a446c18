//! Tone-curve LUT application.
//!
//! A tone curve is a 256-entry byte lookup table applied to the R, G and B
//! channels of RGBA8 pixels; alpha passes through untouched. The adaptive
//! wrapper short-circuits identity curves with a plain copy before either
//! backend is consulted.

use std::future::Future;
use std::time::Instant;

use rayon::prelude::*;

use darkroom_core::{Backend, Error, OperationKind};

use crate::caps::CapabilityProbe;
use crate::processor::{AdaptiveProcessor, ProcessingResult};
use crate::{check_rgba_len, ComputeResult};

/// 256-entry tone lookup table for 8-bit channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneCurve {
    table: [u8; 256],
}

impl ToneCurve {
    /// The identity curve: every value maps to itself.
    pub fn identity() -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self { table }
    }

    /// Curve from a prebuilt table.
    pub fn from_table(table: [u8; 256]) -> Self {
        Self { table }
    }

    /// Curve sampled from a mapping function.
    pub fn from_fn(f: impl Fn(u8) -> u8) -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = f(i as u8);
        }
        Self { table }
    }

    /// Whether every value maps to itself.
    pub fn is_identity(&self) -> bool {
        self.table.iter().enumerate().all(|(i, &v)| v as usize == i)
    }

    /// Mapped value for `v`.
    #[inline]
    pub fn map(&self, v: u8) -> u8 {
        self.table[v as usize]
    }

    /// The raw lookup table.
    pub fn table(&self) -> &[u8; 256] {
        &self.table
    }
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::identity()
    }
}

/// Applies `curve` to the RGB channels of an RGBA8 buffer on the CPU.
///
/// # Errors
///
/// [`darkroom_core::Error::MalformedPixelData`] if the buffer is not whole
/// RGBA pixels.
pub fn apply_tone_curve_cpu(pixels: &[u8], curve: &ToneCurve) -> ComputeResult<Vec<u8>> {
    if pixels.len() % 4 != 0 {
        return Err(Error::malformed_pixel_data(pixels.len(), 4).into());
    }

    let mut out = vec![0u8; pixels.len()];
    out.par_chunks_mut(4)
        .zip(pixels.par_chunks(4))
        .for_each(|(dst, src)| {
            dst[0] = curve.map(src[0]);
            dst[1] = curve.map(src[1]);
            dst[2] = curve.map(src[2]);
            dst[3] = src[3];
        });
    Ok(out)
}

/// Adaptive tone-curve application.
///
/// Validates the buffer against the stated dimensions, short-circuits an
/// identity curve with a copy of the input (neither executor is invoked,
/// reported as CPU work), and otherwise dispatches through `processor`
/// under [`OperationKind::ToneCurve`].
pub async fn apply_tone_curve<P, A, FA, B, FB>(
    processor: &mut AdaptiveProcessor<P>,
    pixels: &[u8],
    width: u32,
    height: u32,
    curve: &ToneCurve,
    accelerated: A,
    fallback: B,
) -> ComputeResult<ProcessingResult<Vec<u8>>>
where
    P: CapabilityProbe,
    A: FnOnce() -> FA,
    FA: Future<Output = ComputeResult<Vec<u8>>>,
    B: FnOnce() -> FB,
    FB: Future<Output = ComputeResult<Vec<u8>>>,
{
    check_rgba_len(pixels, width, height)?;

    if curve.is_identity() {
        let started = Instant::now();
        return Ok(ProcessingResult {
            data: pixels.to_vec(),
            backend: Backend::Cpu,
            elapsed: started.elapsed(),
        });
    }

    processor
        .execute(OperationKind::ToneCurve, width, height, accelerated, fallback)
        .await
}
