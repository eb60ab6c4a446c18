//! Capability snapshots and the probe seam.
//!
//! Backend selection never talks to a device API directly; it consults an
//! immutable [`Capabilities`] snapshot produced once by a
//! [`CapabilityProbe`] during initialization. Swapping the probe swaps the
//! whole acceleration story: [`StaticProbe`] serves fixed snapshots for
//! CPU-only builds and tests, `WgpuProbe` (feature `wgpu`) negotiates a
//! real adapter.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{ComputeError, ComputeResult};

/// Device limits relevant to compute dispatch.
///
/// Defaults are the WebGPU downlevel guarantees, safe to assume on any
/// adapter that exists at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    /// Largest texture edge the device accepts.
    pub max_texture_dimension: u32,
    /// Largest single buffer allocation in bytes.
    pub max_buffer_bytes: u64,
    /// Maximum workgroup size per axis (x, y, z).
    pub max_workgroup_size: [u32; 3],
    /// Maximum workgroups per dispatch dimension.
    pub max_workgroups_per_dimension: u32,
}

impl DeviceLimits {
    /// Conservative downlevel defaults.
    pub const fn downlevel() -> Self {
        Self {
            max_texture_dimension: 8192,
            max_buffer_bytes: 256 << 20,
            max_workgroup_size: [256, 256, 64],
            max_workgroups_per_dimension: 65535,
        }
    }

    /// Whether an RGBA8 image of the given size fits these limits.
    ///
    /// Checks both texture edges and the byte size of the full RGBA8
    /// buffer. Equality is within limits; zero-sized images fit everywhere.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        let bytes = width as u64 * height as u64 * 4;
        width <= self.max_texture_dimension
            && height <= self.max_texture_dimension
            && bytes <= self.max_buffer_bytes
    }
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::downlevel()
    }
}

/// Identity of the adapter behind a capability snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterProfile {
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Graphics API backing the adapter (vulkan, metal, dx12, gl).
    pub backend: String,
    /// Device class (discrete, integrated, cpu, virtual).
    pub device_type: String,
}

/// Immutable snapshot of acceleration capability.
///
/// Produced once per initialization and never refreshed; a device that
/// disappears afterwards shows up as execution failures, which the circuit
/// breaker absorbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether accelerated execution is available at all.
    pub available: bool,
    /// Device limits used for size gating.
    pub limits: DeviceLimits,
    /// Adapter identity, when one was acquired.
    pub adapter: Option<AdapterProfile>,
}

impl Capabilities {
    /// Snapshot for hosts with no usable accelerator.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            limits: DeviceLimits::downlevel(),
            adapter: None,
        }
    }

    /// Available snapshot advertising the given limits.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            available: true,
            limits,
            adapter: None,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Adapter request preferences handed to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePreferences {
    /// Ask for the high-performance adapter on multi-GPU hosts.
    pub prefer_high_performance: bool,
    /// Accept software/CPU adapters when no hardware one exists.
    pub allow_fallback_adapter: bool,
    /// Skip probing entirely and report no acceleration.
    pub force_disabled: bool,
}

impl Default for ProbePreferences {
    fn default() -> Self {
        Self {
            prefer_high_performance: true,
            allow_fallback_adapter: false,
            force_disabled: false,
        }
    }
}

/// Device capability probe.
///
/// Constructor-injected into [`AdaptiveProcessor`](crate::AdaptiveProcessor)
/// so the acceleration layer is swappable without touching selection logic.
pub trait CapabilityProbe {
    /// Queries the platform and produces a capability snapshot.
    ///
    /// May suspend while an adapter is negotiated. An error means the probe
    /// is unusable; callers degrade to CPU-only rather than propagate.
    fn initialize(
        &mut self,
        prefs: &ProbePreferences,
    ) -> impl Future<Output = ComputeResult<Capabilities>>;

    /// Whether a snapshot has been produced and not torn down since.
    fn is_ready(&self) -> bool;

    /// Releases any device handles. The probe may be initialized again.
    fn destroy(&mut self);
}

/// Probe serving a fixed, pre-baked snapshot.
///
/// This is the probe for CPU-only builds, where no device negotiation
/// exists, and the substitutable probe in tests: snapshot contents,
/// readiness, and failure are all scripted at construction.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    snapshot: Capabilities,
    fail: bool,
    ready: bool,
}

impl StaticProbe {
    /// Probe that reports the given snapshot.
    pub fn new(snapshot: Capabilities) -> Self {
        Self {
            snapshot,
            fail: false,
            ready: false,
        }
    }

    /// Probe reporting acceleration available with downlevel limits.
    pub fn available() -> Self {
        Self::new(Capabilities::with_limits(DeviceLimits::downlevel()))
    }

    /// Probe reporting acceleration available with the given limits.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self::new(Capabilities::with_limits(limits))
    }

    /// Probe reporting no acceleration.
    pub fn unavailable() -> Self {
        Self::new(Capabilities::unavailable())
    }

    /// Probe whose initialization always fails.
    pub fn failing() -> Self {
        Self {
            snapshot: Capabilities::unavailable(),
            fail: true,
            ready: false,
        }
    }
}

impl CapabilityProbe for StaticProbe {
    async fn initialize(&mut self, prefs: &ProbePreferences) -> ComputeResult<Capabilities> {
        if self.fail {
            return Err(ComputeError::ProbeFailed("scripted probe failure".into()));
        }
        let snapshot = if prefs.force_disabled {
            Capabilities::unavailable()
        } else {
            self.snapshot.clone()
        };
        self.ready = true;
        Ok(snapshot)
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn destroy(&mut self) {
        self.ready = false;
    }
}
