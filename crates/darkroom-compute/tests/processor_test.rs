//! Adaptive dispatch tests for darkroom-compute.
//!
//! Everything here runs against [`StaticProbe`], so backend selection,
//! failure accounting, and lifecycle behavior are exercised without any
//! device present.

use std::cell::Cell;
use std::collections::HashMap;

use darkroom_compute::{
    AdaptiveProcessor, Backend, ComputeError, ConfigUpdate, DeviceLimits, OperationKind,
    ProcessingContext, ProcessingResult, ProcessorConfig, StaticProbe, ERROR_THRESHOLD,
};

const GPU_DATA: &[u8] = &[1];
const CPU_DATA: &[u8] = &[2];

fn ready(probe: StaticProbe) -> AdaptiveProcessor<StaticProbe> {
    let mut processor = AdaptiveProcessor::new(probe);
    pollster::block_on(processor.initialize());
    processor
}

fn run_ok(
    processor: &mut AdaptiveProcessor<StaticProbe>,
    width: u32,
    height: u32,
) -> ProcessingResult<Vec<u8>> {
    pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        width,
        height,
        || async { Ok(GPU_DATA.to_vec()) },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap()
}

fn run_gpu_failing(processor: &mut AdaptiveProcessor<StaticProbe>) -> ProcessingResult<Vec<u8>> {
    pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async { Err(ComputeError::ExecutionFailed("injected".into())) },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap()
}

// === Selection ===

#[test]
fn test_forced_gpu_overrides_everything() {
    let mut processor = ready(StaticProbe::available());
    processor.configure(ConfigUpdate {
        force_backend: Some(Some(Backend::Gpu)),
        ..ConfigUpdate::default()
    });
    processor.disable_gpu();

    // Forced wins over an open circuit and an absurd image size.
    let gpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        100_000,
        100_000,
        || async {
            gpu_called.set(true);
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();

    assert!(gpu_called.get());
    assert_eq!(result.backend, Backend::Gpu);
    assert_eq!(result.data, GPU_DATA);
}

#[test]
fn test_forced_cpu_skips_accelerated() {
    let mut processor = ready(StaticProbe::available());
    processor.configure(ConfigUpdate {
        force_backend: Some(Some(Backend::Cpu)),
        ..ConfigUpdate::default()
    });

    let gpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async {
            gpu_called.set(true);
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();

    assert!(!gpu_called.get());
    assert_eq!(result.backend, Backend::Cpu);
    assert_eq!(result.data, CPU_DATA);
}

#[test]
fn test_full_hd_runs_accelerated() {
    let mut processor = ready(StaticProbe::available());

    let cpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        1920,
        1080,
        || async { Ok(GPU_DATA.to_vec()) },
        || async {
            cpu_called.set(true);
            Ok(CPU_DATA.to_vec())
        },
    ))
    .unwrap();

    assert!(!cpu_called.get());
    assert_eq!(result.backend, Backend::Gpu);
    assert_eq!(result.data, GPU_DATA);
}

#[test]
fn test_oversized_edge_falls_back() {
    let mut processor = ready(StaticProbe::available());

    // One edge past the gate routes to the CPU without touching the GPU.
    let gpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::Resize,
        8193,
        1080,
        || async {
            gpu_called.set(true);
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();
    assert!(!gpu_called.get());
    assert_eq!(result.backend, Backend::Cpu);

    // The gate reads the longer edge, so a tall image trips it the same way.
    let result = run_ok(&mut processor, 1080, 8193);
    assert_eq!(result.backend, Backend::Cpu);

    // At the gate exactly, the GPU still takes it.
    let result = run_ok(&mut processor, 8192, 1080);
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_device_limits_gate_execution() {
    let limits = DeviceLimits {
        max_texture_dimension: 2048,
        ..DeviceLimits::downlevel()
    };
    let mut processor = ready(StaticProbe::with_limits(limits));

    let result = run_ok(&mut processor, 2049, 100);
    assert_eq!(result.backend, Backend::Cpu);

    let result = run_ok(&mut processor, 2048, 100);
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_operation_toggle_via_configure() {
    let mut processor = ready(StaticProbe::available());
    let switches: HashMap<_, _> = [(OperationKind::ToneCurve, false)].into();
    processor.configure(ConfigUpdate {
        enabled_operations: Some(switches),
        ..ConfigUpdate::default()
    });

    let gpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::ToneCurve,
        64,
        64,
        || async {
            gpu_called.set(true);
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();
    assert!(!gpu_called.get());
    assert_eq!(result.backend, Backend::Cpu);

    // The replacement map dropped every other key; absent reads as enabled.
    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Gpu);
}

// === Circuit breaker ===

#[test]
fn test_three_failures_open_circuit() {
    let mut processor = ready(StaticProbe::available());

    for expected in 1..=ERROR_THRESHOLD {
        let result = run_gpu_failing(&mut processor);
        // Every failed attempt still completes via the fallback.
        assert_eq!(result.backend, Backend::Cpu);
        assert_eq!(result.data, CPU_DATA);
        assert_eq!(processor.error_count(), expected);
    }
    assert!(processor.circuit_open());
}

#[test]
fn test_circuit_stays_closed_below_threshold() {
    let mut processor = ready(StaticProbe::available());
    for _ in 0..ERROR_THRESHOLD - 1 {
        run_gpu_failing(&mut processor);
    }
    assert!(!processor.circuit_open());

    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_open_circuit_never_invokes_accelerated() {
    let mut processor = ready(StaticProbe::available());
    for _ in 0..ERROR_THRESHOLD {
        run_gpu_failing(&mut processor);
    }
    assert!(processor.circuit_open());

    let gpu_called = Cell::new(false);
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async {
            gpu_called.set(true);
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();

    assert!(!gpu_called.get());
    assert_eq!(result.backend, Backend::Cpu);
}

#[test]
fn test_success_resets_failure_streak() {
    let mut processor = ready(StaticProbe::available());
    run_gpu_failing(&mut processor);
    run_gpu_failing(&mut processor);
    assert_eq!(processor.error_count(), 2);

    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Gpu);
    assert_eq!(processor.error_count(), 0);

    // The streak restarts from zero, so two more failures stay below the
    // threshold.
    run_gpu_failing(&mut processor);
    run_gpu_failing(&mut processor);
    assert!(!processor.circuit_open());
}

#[test]
fn test_enable_gpu_closes_circuit() {
    let mut processor = ready(StaticProbe::available());
    for _ in 0..ERROR_THRESHOLD {
        run_gpu_failing(&mut processor);
    }
    assert!(processor.circuit_open());

    processor.enable_gpu();
    assert!(!processor.circuit_open());
    assert_eq!(processor.error_count(), 0);

    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_disable_gpu_is_unconditional() {
    let mut processor = ready(StaticProbe::available());
    assert_eq!(processor.select_backend(OperationKind::Adjustments, 64, 64), Backend::Gpu);

    processor.disable_gpu();
    assert!(processor.circuit_open());
    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Cpu);
}

#[test]
fn test_sync_and_async_share_circuit() {
    let mut processor = ready(StaticProbe::available());

    // Two failures through the synchronous path.
    for _ in 0..2 {
        let result = processor
            .execute_sync(
                OperationKind::Histogram,
                64,
                64,
                || Err(ComputeError::ExecutionFailed("injected".into())),
                || Ok(CPU_DATA.to_vec()),
            )
            .unwrap();
        assert_eq!(result.backend, Backend::Cpu);
    }
    assert_eq!(processor.error_count(), 2);

    // A third through the async path opens the shared circuit.
    run_gpu_failing(&mut processor);
    assert!(processor.circuit_open());

    processor.enable_gpu();
    let result = processor
        .execute_sync(
            OperationKind::Histogram,
            64,
            64,
            || Ok(GPU_DATA.to_vec()),
            || Ok(CPU_DATA.to_vec()),
        )
        .unwrap();
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_fallback_error_propagates() {
    let mut processor = ready(StaticProbe::unavailable());

    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async { Ok(GPU_DATA.to_vec()) },
        || async { Err(ComputeError::ExecutionFailed("cpu kernel broke".into())) },
    ));
    assert!(result.is_err());

    // Same when the GPU attempt failed first: the fallback error is the one
    // the caller sees.
    let mut processor = ready(StaticProbe::available());
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async { Err::<Vec<u8>, _>(ComputeError::ExecutionFailed("gpu broke".into())) },
        || async { Err(ComputeError::ExecutionFailed("cpu kernel broke".into())) },
    ));
    match result {
        Err(ComputeError::ExecutionFailed(msg)) => assert_eq!(msg, "cpu kernel broke"),
        other => panic!("expected fallback error, got {other:?}"),
    }
    assert_eq!(processor.error_count(), 1);
}

// === Lifecycle ===

#[test]
fn test_probe_failure_degrades_to_cpu() {
    let mut processor = ready(StaticProbe::failing());
    assert!(processor.is_initialized());
    assert!(!processor.capabilities().available);

    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Cpu);
}

#[test]
fn test_uninitialized_processor_stays_on_cpu() {
    let mut processor = AdaptiveProcessor::new(StaticProbe::available());
    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Cpu);
}

#[test]
fn test_destroy_allows_reinitialize() {
    let mut processor = ready(StaticProbe::available());
    for _ in 0..ERROR_THRESHOLD {
        run_gpu_failing(&mut processor);
    }

    processor.destroy();
    assert!(!processor.is_initialized());
    assert!(!processor.circuit_open());
    assert_eq!(processor.error_count(), 0);
    assert!(!processor.capabilities().available);

    pollster::block_on(processor.initialize());
    let result = run_ok(&mut processor, 64, 64);
    assert_eq!(result.backend, Backend::Gpu);
}

#[test]
fn test_context_reset_restores_initial_config() {
    let config = ProcessorConfig {
        max_gpu_dimension: 2048,
        ..ProcessorConfig::default()
    };
    let mut context = ProcessingContext::with_config(StaticProbe::available(), config);
    pollster::block_on(context.processor_mut().initialize());

    context.processor_mut().configure(ConfigUpdate {
        force_backend: Some(Some(Backend::Cpu)),
        max_gpu_dimension: Some(64),
        ..ConfigUpdate::default()
    });

    context.reset();
    let processor = context.processor();
    assert!(!processor.is_initialized());
    assert_eq!(processor.config().force_backend, None);
    assert_eq!(processor.config().max_gpu_dimension, 2048);
}

#[test]
fn test_result_reports_elapsed() {
    let mut processor = ready(StaticProbe::available());

    // Wall time covers the executor run itself.
    let result = pollster::block_on(processor.execute(
        OperationKind::Adjustments,
        64,
        64,
        || async {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(GPU_DATA.to_vec())
        },
        || async { Ok(CPU_DATA.to_vec()) },
    ))
    .unwrap();
    assert!(result.elapsed >= std::time::Duration::from_millis(5));
}
