//! Adaptive backend selection and execution.
//!
//! [`AdaptiveProcessor`] owns the dispatch policy: every processing call is
//! tagged with an [`OperationKind`] and routed to the accelerated or the
//! fallback executor based on configuration, the capability snapshot, image
//! size, and observed reliability. Accelerated failures are absorbed and
//! counted; at [`ERROR_THRESHOLD`] consecutive failures a circuit breaker
//! opens and pins all work to the CPU until explicitly re-enabled.
//!
//! The processor is generic over its [`CapabilityProbe`], so the entire
//! acceleration layer can be swapped out without touching selection logic.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use darkroom_core::{Backend, OperationKind};

use crate::caps::{Capabilities, CapabilityProbe, ProbePreferences};
use crate::ComputeResult;

/// Consecutive accelerated failures that open the circuit breaker.
pub const ERROR_THRESHOLD: u32 = 3;

/// Default upper image edge for accelerated execution.
///
/// Images with a larger edge go to the CPU even when the device could
/// technically fit them; beyond this size transfer overhead dominates.
pub const DEFAULT_MAX_GPU_DIMENSION: u32 = 8192;

// =========================================================================
// Configuration
// =========================================================================

/// Processor dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Route every call to this backend unconditionally, bypassing all
    /// suitability checks. `None` selects automatically.
    pub force_backend: Option<Backend>,
    /// Per-operation acceleration switches. An absent key reads as enabled.
    pub enabled_operations: HashMap<OperationKind, bool>,
    /// Largest image edge eligible for accelerated execution (strictly
    /// greater is routed to the CPU; equality is eligible).
    pub max_gpu_dimension: u32,
    /// Emit a debug event with backend and elapsed time per operation.
    pub log_performance: bool,
}

impl ProcessorConfig {
    /// Whether acceleration is enabled for `op` under this config.
    pub fn operation_enabled(&self, op: OperationKind) -> bool {
        self.enabled_operations.get(&op).copied().unwrap_or(true)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            force_backend: None,
            enabled_operations: OperationKind::ALL.iter().map(|op| (*op, true)).collect(),
            max_gpu_dimension: DEFAULT_MAX_GPU_DIMENSION,
            log_performance: false,
        }
    }
}

/// Shallow configuration patch.
///
/// Each populated field overwrites the corresponding config field wholesale;
/// in particular `enabled_operations` replaces the whole map rather than
/// merging keys. `force_backend` is doubly optional so a patch can set a
/// forced backend (`Some(Some(b))`), clear one (`Some(None)`), or leave the
/// current value alone (`None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    /// New forced backend, if the patch touches it.
    pub force_backend: Option<Option<Backend>>,
    /// Replacement per-operation switch map.
    pub enabled_operations: Option<HashMap<OperationKind, bool>>,
    /// New accelerated size gate.
    pub max_gpu_dimension: Option<u32>,
    /// New performance-logging switch.
    pub log_performance: Option<bool>,
}

impl ConfigUpdate {
    /// Applies this patch to `config`.
    pub fn apply_to(self, config: &mut ProcessorConfig) {
        if let Some(forced) = self.force_backend {
            config.force_backend = forced;
        }
        if let Some(ops) = self.enabled_operations {
            config.enabled_operations = ops;
        }
        if let Some(dim) = self.max_gpu_dimension {
            config.max_gpu_dimension = dim;
        }
        if let Some(log) = self.log_performance {
            config.log_performance = log;
        }
    }
}

// =========================================================================
// Results
// =========================================================================

/// Outcome of one adaptive processing call.
///
/// Always complete: `data` is the full operation output regardless of which
/// backend produced it or whether a silent fallback happened along the way.
#[derive(Debug, Clone)]
pub struct ProcessingResult<T> {
    /// Operation output.
    pub data: T,
    /// Backend that produced `data`.
    pub backend: Backend,
    /// Wall time for the whole call, failed accelerated attempt included.
    pub elapsed: Duration,
}

// =========================================================================
// Processor
// =========================================================================

/// Adaptive processor routing operations between GPU and CPU backends.
///
/// One instance serves one session. Both execution entry points take
/// `&mut self`, so overlapping calls on the same instance are rejected at
/// compile time; the engine itself takes no locks, and cross-thread sharing
/// needs external synchronization.
pub struct AdaptiveProcessor<P: CapabilityProbe> {
    probe: P,
    config: ProcessorConfig,
    capabilities: Capabilities,
    initialized: bool,
    error_count: u32,
    circuit_open: bool,
}

impl<P: CapabilityProbe> AdaptiveProcessor<P> {
    /// Processor with the default configuration, not yet initialized.
    pub fn new(probe: P) -> Self {
        Self::with_config(probe, ProcessorConfig::default())
    }

    /// Processor with an explicit configuration, not yet initialized.
    pub fn with_config(probe: P, config: ProcessorConfig) -> Self {
        Self {
            probe,
            config,
            capabilities: Capabilities::unavailable(),
            initialized: false,
            error_count: 0,
            circuit_open: false,
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Probes the device and captures the capability snapshot.
    ///
    /// Idempotent: repeat calls on an initialized processor return
    /// immediately. Probe failure is absorbed: the processor comes up in a
    /// degraded CPU-only state rather than failing construction of the
    /// session around it.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }

        let prefs = ProbePreferences {
            prefer_high_performance: true,
            allow_fallback_adapter: false,
            force_disabled: self.config.force_backend == Some(Backend::Cpu),
        };

        match self.probe.initialize(&prefs).await {
            Ok(caps) => {
                debug!(
                    available = caps.available,
                    adapter = caps.adapter.as_ref().map(|a| a.name.as_str()),
                    "capability probe complete"
                );
                self.capabilities = caps;
            }
            Err(err) => {
                warn!(error = %err, "capability probe failed, continuing cpu-only");
                self.capabilities = Capabilities::unavailable();
            }
        }
        self.initialized = true;
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Tears the processor down to its pre-initialization state.
    ///
    /// Destroys the probe's device handles and zeroes all failure
    /// accounting. The processor can be initialized again afterwards.
    pub fn destroy(&mut self) {
        self.probe.destroy();
        self.capabilities = Capabilities::unavailable();
        self.initialized = false;
        self.error_count = 0;
        self.circuit_open = false;
    }

    // ---------------------------------------------------------------------
    // State inspection
    // ---------------------------------------------------------------------

    /// The capability snapshot captured at initialization.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Current dispatch configuration.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The injected capability probe.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Consecutive accelerated failures observed since the last success.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Whether the circuit breaker has the GPU disabled.
    pub fn circuit_open(&self) -> bool {
        self.circuit_open
    }

    /// Whether `backend` can currently serve work.
    ///
    /// The CPU always can. The GPU can when the probe is ready, the
    /// snapshot reports availability, the circuit is closed, and the config
    /// does not force the CPU.
    pub fn is_backend_available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Cpu => true,
            Backend::Gpu => {
                self.probe.is_ready()
                    && self.capabilities.available
                    && !self.circuit_open
                    && self.config.force_backend != Some(Backend::Cpu)
            }
        }
    }

    /// The backend a size-agnostic operation would run on right now.
    pub fn active_backend(&self) -> Backend {
        if let Some(forced) = self.config.force_backend {
            return forced;
        }
        if self.is_backend_available(Backend::Gpu) {
            Backend::Gpu
        } else {
            Backend::Cpu
        }
    }

    // ---------------------------------------------------------------------
    // Configuration and manual controls
    // ---------------------------------------------------------------------

    /// Applies a shallow configuration patch.
    ///
    /// Affects subsequent calls only; in-flight state (error counts, the
    /// circuit) is left alone.
    pub fn configure(&mut self, update: ConfigUpdate) {
        update.apply_to(&mut self.config);
    }

    /// Re-enables acceleration after failures or a manual disable.
    ///
    /// Closes the circuit and resets the failure count. Does not re-probe:
    /// if the snapshot says no device exists, selection still yields the
    /// CPU.
    pub fn enable_gpu(&mut self) {
        self.circuit_open = false;
        self.error_count = 0;
    }

    /// Manually disables acceleration by opening the circuit.
    ///
    /// Independent of the failure count; [`enable_gpu`](Self::enable_gpu)
    /// undoes it.
    pub fn disable_gpu(&mut self) {
        self.circuit_open = true;
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    /// Chooses the backend for one operation on a `width x height` image.
    ///
    /// Checks run in strict precedence order, first match wins:
    ///
    /// 1. forced backend in config (returned even if unsuitable)
    /// 2. circuit open -> cpu
    /// 3. snapshot not ready or unavailable -> cpu
    /// 4. operation disabled in config -> cpu
    /// 5. `max(width, height)` strictly above the size gate -> cpu
    /// 6. device limits too small for the image -> cpu
    /// 7. gpu
    ///
    /// Pure with respect to observable state: no counters move here.
    pub fn select_backend(&self, op: OperationKind, width: u32, height: u32) -> Backend {
        if let Some(forced) = self.config.force_backend {
            return forced;
        }
        if self.circuit_open {
            return Backend::Cpu;
        }
        if !self.probe.is_ready() || !self.capabilities.available {
            return Backend::Cpu;
        }
        if !self.config.operation_enabled(op) {
            return Backend::Cpu;
        }
        if width.max(height) > self.config.max_gpu_dimension {
            return Backend::Cpu;
        }
        if !self.capabilities.limits.fits(width, height) {
            return Backend::Cpu;
        }
        Backend::Gpu
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    /// Runs one operation, suspending across the chosen executor.
    ///
    /// When selection picks the GPU the `accelerated` executor runs first;
    /// on failure the error is logged, counted against the circuit breaker,
    /// and the call silently completes via `fallback`. When selection picks
    /// the CPU only `fallback` runs. Fallback errors always propagate.
    pub async fn execute<T, A, FA, B, FB>(
        &mut self,
        op: OperationKind,
        width: u32,
        height: u32,
        accelerated: A,
        fallback: B,
    ) -> ComputeResult<ProcessingResult<T>>
    where
        A: FnOnce() -> FA,
        FA: Future<Output = ComputeResult<T>>,
        B: FnOnce() -> FB,
        FB: Future<Output = ComputeResult<T>>,
    {
        let started = Instant::now();
        if self.select_backend(op, width, height) == Backend::Gpu {
            if let Some(data) = self.record_gpu_outcome(op, accelerated().await) {
                return Ok(self.finish(op, data, Backend::Gpu, started));
            }
        }
        let data = fallback().await?;
        Ok(self.finish(op, data, Backend::Cpu, started))
    }

    /// Synchronous twin of [`execute`](Self::execute).
    ///
    /// Identical selection and failure accounting; for operations whose
    /// executors complete without an await point (histogram read-back, CPU
    /// kernels).
    pub fn execute_sync<T>(
        &mut self,
        op: OperationKind,
        width: u32,
        height: u32,
        accelerated: impl FnOnce() -> ComputeResult<T>,
        fallback: impl FnOnce() -> ComputeResult<T>,
    ) -> ComputeResult<ProcessingResult<T>> {
        let started = Instant::now();
        if self.select_backend(op, width, height) == Backend::Gpu {
            if let Some(data) = self.record_gpu_outcome(op, accelerated()) {
                return Ok(self.finish(op, data, Backend::Gpu, started));
            }
        }
        let data = fallback()?;
        Ok(self.finish(op, data, Backend::Cpu, started))
    }

    /// Folds an accelerated attempt into the failure accounting.
    ///
    /// Success resets the failure streak and yields the data. Failure is
    /// absorbed here: log, count, open the circuit at the threshold, and
    /// yield `None` so the caller proceeds to the fallback.
    fn record_gpu_outcome<T>(&mut self, op: OperationKind, outcome: ComputeResult<T>) -> Option<T> {
        match outcome {
            Ok(data) => {
                self.error_count = 0;
                Some(data)
            }
            Err(err) => {
                self.error_count += 1;
                warn!(
                    op = op.name(),
                    error = %err,
                    error_count = self.error_count,
                    "accelerated execution failed, falling back to cpu"
                );
                if self.error_count >= ERROR_THRESHOLD && !self.circuit_open {
                    self.circuit_open = true;
                    warn!(
                        error_count = self.error_count,
                        "failure threshold reached, gpu circuit opened"
                    );
                }
                None
            }
        }
    }

    fn finish<T>(
        &self,
        op: OperationKind,
        data: T,
        backend: Backend,
        started: Instant,
    ) -> ProcessingResult<T> {
        let elapsed = started.elapsed();
        if self.config.log_performance {
            debug!(
                op = op.name(),
                backend = backend.name(),
                elapsed_us = elapsed.as_micros() as u64,
                "operation complete"
            );
        }
        ProcessingResult {
            data,
            backend,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{DeviceLimits, StaticProbe};

    fn ready_processor() -> AdaptiveProcessor<StaticProbe> {
        let mut proc = AdaptiveProcessor::new(StaticProbe::available());
        pollster::block_on(proc.initialize());
        proc
    }

    #[test]
    fn test_config_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.force_backend, None);
        assert_eq!(config.max_gpu_dimension, DEFAULT_MAX_GPU_DIMENSION);
        assert!(!config.log_performance);
        for op in OperationKind::ALL {
            assert!(config.operation_enabled(op));
        }
    }

    #[test]
    fn test_config_update_is_shallow() {
        let mut config = ProcessorConfig::default();
        ConfigUpdate {
            max_gpu_dimension: Some(4096),
            ..ConfigUpdate::default()
        }
        .apply_to(&mut config);

        assert_eq!(config.max_gpu_dimension, 4096);
        assert_eq!(config.force_backend, None);
        assert!(config.operation_enabled(OperationKind::Resize));
    }

    #[test]
    fn test_config_update_replaces_operation_map_wholesale() {
        let mut config = ProcessorConfig::default();
        let patch: HashMap<_, _> = [(OperationKind::ToneCurve, false)].into();
        ConfigUpdate {
            enabled_operations: Some(patch),
            ..ConfigUpdate::default()
        }
        .apply_to(&mut config);

        assert!(!config.operation_enabled(OperationKind::ToneCurve));
        // Keys absent from the replacement map read as enabled.
        assert!(config.operation_enabled(OperationKind::Histogram));
    }

    #[test]
    fn test_config_update_can_clear_forced_backend() {
        let mut config = ProcessorConfig {
            force_backend: Some(Backend::Cpu),
            ..ProcessorConfig::default()
        };

        ConfigUpdate {
            force_backend: Some(None),
            ..ConfigUpdate::default()
        }
        .apply_to(&mut config);
        assert_eq!(config.force_backend, None);
    }

    #[test]
    fn test_uninitialized_selects_cpu() {
        let proc = AdaptiveProcessor::new(StaticProbe::available());
        assert!(!proc.is_initialized());
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Cpu
        );
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut proc = ready_processor();
        assert!(proc.is_initialized());
        pollster::block_on(proc.initialize());
        assert!(proc.is_initialized());
        assert!(proc.capabilities().available);
    }

    #[test]
    fn test_probe_failure_degrades_to_cpu() {
        let mut proc = AdaptiveProcessor::new(StaticProbe::failing());
        pollster::block_on(proc.initialize());

        assert!(proc.is_initialized());
        assert!(!proc.capabilities().available);
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Cpu
        );
        assert_eq!(proc.active_backend(), Backend::Cpu);
    }

    #[test]
    fn test_selection_precedence_forced_wins() {
        let mut proc = ready_processor();
        proc.configure(ConfigUpdate {
            force_backend: Some(Some(Backend::Gpu)),
            ..ConfigUpdate::default()
        });
        proc.disable_gpu();

        // Forced beats the open circuit and even absurd sizes.
        assert_eq!(
            proc.select_backend(OperationKind::Resize, 100_000, 100_000),
            Backend::Gpu
        );

        proc.configure(ConfigUpdate {
            force_backend: Some(Some(Backend::Cpu)),
            ..ConfigUpdate::default()
        });
        proc.enable_gpu();
        assert_eq!(proc.select_backend(OperationKind::Resize, 4, 4), Backend::Cpu);
    }

    #[test]
    fn test_selection_respects_circuit() {
        let mut proc = ready_processor();
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Gpu
        );

        proc.disable_gpu();
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Cpu
        );

        proc.enable_gpu();
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Gpu
        );
    }

    #[test]
    fn test_selection_respects_operation_switch() {
        let mut proc = ready_processor();
        let switches: HashMap<_, _> = [(OperationKind::ToneCurve, false)].into();
        proc.configure(ConfigUpdate {
            enabled_operations: Some(switches),
            ..ConfigUpdate::default()
        });

        assert_eq!(
            proc.select_backend(OperationKind::ToneCurve, 64, 64),
            Backend::Cpu
        );
        assert_eq!(
            proc.select_backend(OperationKind::Adjustments, 64, 64),
            Backend::Gpu
        );
    }

    #[test]
    fn test_selection_size_gate_is_strict() {
        let proc = ready_processor();
        let dim = proc.config().max_gpu_dimension;

        assert_eq!(
            proc.select_backend(OperationKind::Resize, dim, 32),
            Backend::Gpu
        );
        assert_eq!(
            proc.select_backend(OperationKind::Resize, dim + 1, 32),
            Backend::Cpu
        );
        assert_eq!(
            proc.select_backend(OperationKind::Resize, 32, dim + 1),
            Backend::Cpu
        );
    }

    #[test]
    fn test_selection_respects_device_limits() {
        let limits = DeviceLimits {
            max_texture_dimension: 2048,
            ..DeviceLimits::downlevel()
        };
        let mut proc = AdaptiveProcessor::new(StaticProbe::with_limits(limits));
        pollster::block_on(proc.initialize());

        assert_eq!(
            proc.select_backend(OperationKind::Resize, 2048, 2048),
            Backend::Gpu
        );
        assert_eq!(
            proc.select_backend(OperationKind::Resize, 2049, 16),
            Backend::Cpu
        );
    }

    #[test]
    fn test_zero_dimension_is_within_limits() {
        let proc = ready_processor();
        assert_eq!(
            proc.select_backend(OperationKind::Clipping, 0, 0),
            Backend::Gpu
        );
    }

    #[test]
    fn test_destroy_returns_to_pre_init_state() {
        let mut proc = ready_processor();
        proc.disable_gpu();
        proc.destroy();

        assert!(!proc.is_initialized());
        assert!(!proc.circuit_open());
        assert_eq!(proc.error_count(), 0);
        assert!(!proc.probe().is_ready());

        pollster::block_on(proc.initialize());
        assert!(proc.is_initialized());
        assert_eq!(proc.active_backend(), Backend::Gpu);
    }

    #[test]
    fn test_forcing_cpu_disables_probe() {
        let config = ProcessorConfig {
            force_backend: Some(Backend::Cpu),
            ..ProcessorConfig::default()
        };
        let mut proc = AdaptiveProcessor::with_config(StaticProbe::available(), config);
        pollster::block_on(proc.initialize());

        // The probe honored force_disabled and reported no acceleration.
        assert!(!proc.capabilities().available);
        assert!(!proc.is_backend_available(Backend::Gpu));
    }
}
