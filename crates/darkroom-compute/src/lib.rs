//! Adaptive GPU/CPU dispatch engine for image processing.
//!
//! Routes per-operation work between a hardware-accelerated backend (wgpu)
//! and a portable CPU fallback based on runtime capability, configuration,
//! and observed reliability. Accelerated failures are absorbed, counted,
//! and after repeated failures a circuit breaker pins work to the CPU.
//!
//! # Architecture
//!
//! ```text
//! ProcessingContext (session lifecycle)
//!     └── AdaptiveProcessor<P: CapabilityProbe> (selection + circuit breaker)
//!             ├── CapabilityProbe (device snapshot seam)
//!             │       ├── StaticProbe (fixed snapshot, no device)
//!             │       └── WgpuProbe (real adapter, feature "wgpu")
//!             ├── accelerated executors (GpuToneCurve, GpuMaskPipeline)
//!             └── fallback kernels (rayon)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use darkroom_compute::{AdaptiveProcessor, StaticProbe, ToneCurve};
//! use darkroom_compute::tone_curve::{apply_tone_curve, apply_tone_curve_cpu};
//!
//! let mut proc = AdaptiveProcessor::new(StaticProbe::unavailable());
//! pollster::block_on(proc.initialize());
//!
//! let curve = ToneCurve::from_fn(|v| 255 - v);
//! let result = pollster::block_on(apply_tone_curve(
//!     &mut proc, &pixels, 1920, 1080, &curve,
//!     || async { Err(ComputeError::not_initialized("gpu tone curve")) },
//!     || async { apply_tone_curve_cpu(&pixels, &curve) },
//! ))?;
//! ```

pub mod caps;
pub mod context;
pub mod histogram;
pub mod mask;
pub mod pool;
pub mod processor;
pub mod tone_curve;

#[cfg(feature = "wgpu")]
pub mod gpu;
#[cfg(feature = "wgpu")]
mod shaders;

pub use caps::{
    AdapterProfile, Capabilities, CapabilityProbe, DeviceLimits, ProbePreferences, StaticProbe,
};
pub use context::ProcessingContext;
pub use histogram::{compute_histogram_cpu, Histogram};
pub use mask::{apply_masks, apply_masks_cpu, Mask, MaskShape};
pub use pool::{DoubleBuffered, PoolStats, ResourcePool, DEFAULT_MAX_POOL_SIZE};
pub use processor::{
    AdaptiveProcessor, ConfigUpdate, ProcessingResult, ProcessorConfig, DEFAULT_MAX_GPU_DIMENSION,
    ERROR_THRESHOLD,
};
pub use tone_curve::{apply_tone_curve, apply_tone_curve_cpu, ToneCurve};

#[cfg(feature = "wgpu")]
pub use gpu::{BufferKey, GpuMaskPipeline, GpuToneCurve, WgpuProbe};

// Shared vocabulary from the foundation crate.
pub use darkroom_core::{Backend, OperationKind};

use thiserror::Error;

/// Dispatch and execution errors
#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Capability probe failed: {0}")]
    ProbeFailed(String),

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("{service} has not been initialized")]
    NotInitialized { service: &'static str },

    #[error("Accelerated execution failed: {0}")]
    ExecutionFailed(String),

    #[error("{0}")]
    Core(#[from] darkroom_core::Error),
}

impl ComputeError {
    /// Creates a [`ComputeError::NotInitialized`] for the named service.
    #[inline]
    pub fn not_initialized(service: &'static str) -> Self {
        Self::NotInitialized { service }
    }

    /// Returns `true` if this error indicates malformed caller input.
    ///
    /// Malformed input always propagates to the caller; it is never
    /// absorbed by the fallback machinery.
    #[inline]
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::Core(e) if e.is_malformed_input())
    }
}

pub type ComputeResult<T> = Result<T, ComputeError>;

/// Validates an RGBA8 buffer against its stated dimensions.
pub(crate) fn check_rgba_len(pixels: &[u8], width: u32, height: u32) -> ComputeResult<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            darkroom_core::Error::invalid_dimensions(width, height, "pixel byte count overflows")
        })?;
    if pixels.len() != expected {
        return Err(darkroom_core::Error::buffer_size_mismatch(expected, pixels.len()).into());
    }
    Ok(())
}
