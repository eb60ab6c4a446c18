//! Session-scoped processing context.
//!
//! One [`ProcessingContext`] is constructed at session start and handed to
//! the call sites that need dispatch, instead of consulting ambient global
//! state. [`reset`](ProcessingContext::reset) gives test isolation and
//! device-loss recovery a single teardown point.

use crate::caps::{CapabilityProbe, StaticProbe};
use crate::processor::{AdaptiveProcessor, ConfigUpdate, ProcessorConfig};

/// Owns one [`AdaptiveProcessor`] for the lifetime of an editing session.
pub struct ProcessingContext<P: CapabilityProbe> {
    processor: AdaptiveProcessor<P>,
    initial_config: ProcessorConfig,
}

impl ProcessingContext<StaticProbe> {
    /// CPU-only context requiring no device support.
    pub fn cpu_only() -> Self {
        Self::new(StaticProbe::unavailable())
    }
}

impl<P: CapabilityProbe> ProcessingContext<P> {
    /// Context with the default dispatch configuration.
    pub fn new(probe: P) -> Self {
        Self::with_config(probe, ProcessorConfig::default())
    }

    /// Context with an explicit configuration, remembered for resets.
    pub fn with_config(probe: P, config: ProcessorConfig) -> Self {
        Self {
            processor: AdaptiveProcessor::with_config(probe, config.clone()),
            initial_config: config,
        }
    }

    /// The session's processor.
    pub fn processor(&self) -> &AdaptiveProcessor<P> {
        &self.processor
    }

    /// Mutable access for execution and control calls.
    pub fn processor_mut(&mut self) -> &mut AdaptiveProcessor<P> {
        &mut self.processor
    }

    /// Destroys the current processor state, then restores the
    /// construction-time configuration.
    ///
    /// The outgoing state is fully torn down before anything is restored;
    /// afterwards the context behaves like a freshly constructed one and
    /// the caller re-initializes it.
    pub fn reset(&mut self) {
        self.processor.destroy();
        self.processor.configure(ConfigUpdate {
            force_backend: Some(self.initial_config.force_backend),
            enabled_operations: Some(self.initial_config.enabled_operations.clone()),
            max_gpu_dimension: Some(self.initial_config.max_gpu_dimension),
            log_performance: Some(self.initial_config.log_performance),
        });
    }

    /// Tears the session down without restoring anything.
    pub fn destroy(&mut self) {
        self.processor.destroy();
    }
}
