//! Linear and radial mask application.
//!
//! A mask stack blends a base image toward an adjusted image wherever its
//! masks cover. Coverage is sampled at pixel centers; each enabled mask is
//! one blend pass over the working image, so a stack of n masks is n
//! sequential passes. The GPU path ping-pongs a buffer pair through the
//! same pass sequence, with identical math.

use std::future::Future;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use darkroom_core::{Backend, OperationKind};

use crate::caps::CapabilityProbe;
use crate::processor::{AdaptiveProcessor, ProcessingResult};
use crate::{check_rgba_len, ComputeResult};

/// Gradients with a squared length at or below this count as zero-length.
/// The mask shader uses the same cutoff.
const MIN_GRADIENT_LEN_SQ: f32 = 1e-6;

/// Mask geometry, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaskShape {
    /// Gradient ramp from 0 at `start` to 1 at `end`, measured along the
    /// segment between them. A zero-length segment covers fully.
    Linear {
        /// Point where coverage is 0.
        start: [f32; 2],
        /// Point where coverage reaches 1.
        end: [f32; 2],
    },
    /// Full coverage inside `inner_radius`, falling linearly to 0 at
    /// `outer_radius`. `outer_radius <= inner_radius` is a hard edge.
    Radial {
        /// Center of the falloff.
        center: [f32; 2],
        /// Radius of full coverage.
        inner_radius: f32,
        /// Radius where coverage reaches 0.
        outer_radius: f32,
    },
}

impl MaskShape {
    /// The operation tag this shape dispatches under.
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            MaskShape::Linear { .. } => OperationKind::LinearMask,
            MaskShape::Radial { .. } => OperationKind::RadialMask,
        }
    }

    /// Geometric coverage at a point, before invert and opacity.
    fn raw_coverage(&self, x: f32, y: f32) -> f32 {
        match *self {
            MaskShape::Linear { start, end } => {
                let dx = end[0] - start[0];
                let dy = end[1] - start[1];
                let len_sq = dx * dx + dy * dy;
                if len_sq <= MIN_GRADIENT_LEN_SQ {
                    return 1.0;
                }
                let t = ((x - start[0]) * dx + (y - start[1]) * dy) / len_sq;
                t.clamp(0.0, 1.0)
            }
            MaskShape::Radial {
                center,
                inner_radius,
                outer_radius,
            } => {
                let dist = ((x - center[0]).powi(2) + (y - center[1]).powi(2)).sqrt();
                if outer_radius <= inner_radius {
                    return if dist <= inner_radius { 1.0 } else { 0.0 };
                }
                (1.0 - (dist - inner_radius) / (outer_radius - inner_radius)).clamp(0.0, 1.0)
            }
        }
    }
}

/// One mask in a stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    /// Whether this mask participates at all.
    pub enabled: bool,
    /// Flip coverage: masked becomes unmasked.
    pub invert: bool,
    /// Strength multiplier in [0, 1].
    pub opacity: f32,
    /// Geometry.
    pub shape: MaskShape,
}

impl Mask {
    /// Enabled, non-inverted, full-opacity mask over `shape`.
    pub fn new(shape: MaskShape) -> Self {
        Self {
            enabled: true,
            invert: false,
            opacity: 1.0,
            shape,
        }
    }

    /// Effective coverage at a point.
    ///
    /// Geometry first, then invert, then the opacity scale, clamped to
    /// [0, 1].
    pub fn coverage(&self, x: f32, y: f32) -> f32 {
        let raw = self.shape.raw_coverage(x, y);
        let oriented = if self.invert { 1.0 - raw } else { raw };
        (oriented * self.opacity).clamp(0.0, 1.0)
    }
}

/// Applies a mask stack on the CPU.
///
/// Starts from a copy of `base` and blends it toward `adjusted` by each
/// enabled mask's coverage, one pass per mask. Disabled masks cost nothing.
///
/// # Errors
///
/// [`darkroom_core::Error::BufferSizeMismatch`] if either buffer disagrees
/// with the stated dimensions.
pub fn apply_masks_cpu(
    base: &[u8],
    adjusted: &[u8],
    width: u32,
    height: u32,
    masks: &[Mask],
) -> ComputeResult<Vec<u8>> {
    check_rgba_len(base, width, height)?;
    check_rgba_len(adjusted, width, height)?;

    let mut out = base.to_vec();
    let stride = width as usize * 4;
    if stride == 0 {
        return Ok(out);
    }

    for mask in masks.iter().filter(|m| m.enabled) {
        out.par_chunks_mut(stride)
            .zip(adjusted.par_chunks(stride))
            .enumerate()
            .for_each(|(y, (row, adj_row))| {
                let py = y as f32 + 0.5;
                for x in 0..width as usize {
                    let c = mask.coverage(x as f32 + 0.5, py);
                    if c <= 0.0 {
                        continue;
                    }
                    let o = x * 4;
                    for ch in 0..4 {
                        let b = row[o + ch] as f32;
                        let a = adj_row[o + ch] as f32;
                        row[o + ch] = (b + (a - b) * c).round() as u8;
                    }
                }
            });
    }
    Ok(out)
}

/// Adaptive mask-stack application.
///
/// Validates both buffers against the stated dimensions. A stack with no
/// individually-enabled mask short-circuits with a copy of `base` (neither
/// executor is invoked, reported as CPU work); otherwise the call
/// dispatches under the first enabled mask's operation tag.
pub async fn apply_masks<P, A, FA, B, FB>(
    processor: &mut AdaptiveProcessor<P>,
    base: &[u8],
    adjusted: &[u8],
    width: u32,
    height: u32,
    masks: &[Mask],
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
    check_rgba_len(base, width, height)?;
    check_rgba_len(adjusted, width, height)?;

    let Some(first_enabled) = masks.iter().find(|m| m.enabled) else {
        let started = Instant::now();
        return Ok(ProcessingResult {
            data: base.to_vec(),
            backend: Backend::Cpu,
            elapsed: started.elapsed(),
        });
    };

    let op = first_enabled.shape.operation_kind();
    processor
        .execute(op, width, height, accelerated, fallback)
        .await
}
