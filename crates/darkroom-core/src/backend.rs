//! Backend identity and operation tags for adaptive dispatch.
//!
//! [`Backend`] names the two execution paths the engine can route work to.
//! [`OperationKind`] is the closed set of operation tags used as selection
//! keys; the dispatcher never inspects operation payloads, only these tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which execution backend handled (or should handle) an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Hardware-accelerated compute on a GPU device.
    Gpu,
    /// Portable software path on the CPU.
    Cpu,
}

impl Backend {
    /// Human-readable backend name.
    pub const fn name(&self) -> &'static str {
        match self {
            Backend::Gpu => "gpu",
            Backend::Cpu => "cpu",
        }
    }

    /// The CPU path requires no device support and never goes away.
    pub const fn is_always_available(&self) -> bool {
        matches!(self, Backend::Cpu)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation tags the dispatcher selects backends for.
///
/// Each processing call is tagged with one of these so backend selection can
/// honor per-operation enablement. Adding a variant here is the only change
/// needed to route a new operation family through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Global tone adjustments (exposure, contrast, saturation).
    Adjustments,
    /// 256-entry tone-curve LUT application.
    ToneCurve,
    /// Linear gradient mask application.
    LinearMask,
    /// Radial gradient mask application.
    RadialMask,
    /// Per-channel histogram computation.
    Histogram,
    /// Image resampling.
    Resize,
    /// Rotation by an arbitrary angle.
    Rotation,
    /// Crop to a sub-rectangle.
    Clipping,
}

impl OperationKind {
    /// Every operation tag, in declaration order.
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Adjustments,
        OperationKind::ToneCurve,
        OperationKind::LinearMask,
        OperationKind::RadialMask,
        OperationKind::Histogram,
        OperationKind::Resize,
        OperationKind::Rotation,
        OperationKind::Clipping,
    ];

    /// Stable lowercase name used in logs and config keys.
    pub const fn name(&self) -> &'static str {
        match self {
            OperationKind::Adjustments => "adjustments",
            OperationKind::ToneCurve => "tone_curve",
            OperationKind::LinearMask => "linear_mask",
            OperationKind::RadialMask => "radial_mask",
            OperationKind::Histogram => "histogram",
            OperationKind::Resize => "resize",
            OperationKind::Rotation => "rotation",
            OperationKind::Clipping => "clipping",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Gpu.name(), "gpu");
        assert_eq!(Backend::Cpu.name(), "cpu");
        assert_eq!(Backend::Cpu.to_string(), "cpu");
    }

    #[test]
    fn test_cpu_always_available() {
        assert!(Backend::Cpu.is_always_available());
        assert!(!Backend::Gpu.is_always_available());
    }

    #[test]
    fn test_operation_kind_all_distinct() {
        for (i, a) in OperationKind::ALL.iter().enumerate() {
            for b in OperationKind::ALL.iter().skip(i + 1) {
                assert_ne!(a, b);
                assert_ne!(a.name(), b.name());
            }
        }
        assert_eq!(OperationKind::ALL.len(), 8);
    }

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::ToneCurve.to_string(), "tone_curve");
        assert_eq!(OperationKind::RadialMask.to_string(), "radial_mask");
    }
}
