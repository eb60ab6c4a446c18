//! wgpu capability probe and compute executors.
//!
//! Everything here sits behind the `wgpu` feature. [`WgpuProbe`] negotiates
//! an adapter and publishes a [`Capabilities`] snapshot; [`GpuToneCurve`]
//! and [`GpuMaskPipeline`] own compute pipelines plus pooled buffers for
//! the per-frame paths. Images cross the bus as packed RGBA8 words, so
//! pixel slices upload and download without conversion.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use darkroom_core::DispatchGrid;

use crate::caps::{AdapterProfile, Capabilities, CapabilityProbe, DeviceLimits, ProbePreferences};
use crate::mask::{Mask, MaskShape};
use crate::pool::{DoubleBuffered, PoolStats, ResourcePool};
use crate::shaders;
use crate::tone_curve::ToneCurve;
use crate::{check_rgba_len, ComputeError, ComputeResult};

// =============================================================================
// Uniform Buffers
// =============================================================================

/// Dimensions uniform: [width, height, 0, 0]
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DimsUniform {
    dims: [u32; 4],
}

/// Mask parameters uniform.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct MaskUniform {
    dims: [u32; 4],
    shape: [f32; 4],
    params: [f32; 4],
}

impl MaskUniform {
    fn new(mask: &Mask, width: u32, height: u32) -> Self {
        let (kind, shape) = match mask.shape {
            MaskShape::Linear { start, end } => (0, [start[0], start[1], end[0], end[1]]),
            MaskShape::Radial {
                center,
                inner_radius,
                outer_radius,
            } => (1, [center[0], center[1], inner_radius, outer_radius]),
        };

        Self {
            dims: [width, height, kind, u32::from(mask.invert)],
            shape,
            params: [mask.opacity, 0.0, 0.0, 0.0],
        }
    }
}

// =============================================================================
// Buffer Pooling
// =============================================================================

/// Pool key for reusable GPU buffers.
///
/// Two buffers are interchangeable when they match in byte size and usage
/// flags, so the key carries exactly those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Buffer size in bytes.
    pub size: u64,
    /// Usage flags the buffer was created with.
    pub usage: wgpu::BufferUsages,
}

impl BufferKey {
    /// Storage buffer the host writes into.
    fn upload(size: u64) -> Self {
        Self {
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        }
    }

    /// Storage buffer copied back to the host.
    fn readback(size: u64) -> Self {
        Self {
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        }
    }

    /// Storage buffer usable on either side of a ping-pong chain.
    fn ping_pong(size: u64) -> Self {
        Self {
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        }
    }

    /// Host-mappable staging buffer.
    fn staging(size: u64) -> Self {
        Self {
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        }
    }
}

fn pooled_buffer(
    device: &wgpu::Device,
    pool: &mut ResourcePool<BufferKey, wgpu::Buffer>,
    label: &str,
    key: BufferKey,
) -> wgpu::Buffer {
    pool.acquire_or_else(key, || {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: key.size,
            usage: key.usage,
            mapped_at_creation: false,
        })
    })
}

// =============================================================================
// Shared Plumbing
// =============================================================================

fn create_pipeline(device: &wgpu::Device, source: &str, label: &str) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: None, // Auto layout
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn dims_buffer(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Buffer {
    let uniform = DimsUniform {
        dims: [width, height, 0, 0],
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("dims_uniform"),
        contents: bytemuck::bytes_of(&uniform),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

/// Execute compute dispatch and wait.
fn dispatch(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    grid: DispatchGrid,
) {
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("compute_encoder"),
    });

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("compute_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(grid.x, grid.y, grid.z);
    }

    queue.submit(std::iter::once(encoder.finish()));
    device.poll(wgpu::Maintain::Wait);
}

/// Copy a device buffer into `staging`, map it, and read the bytes out.
fn read_back(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    src: &wgpu::Buffer,
    staging: &wgpu::Buffer,
    size: u64,
) -> ComputeResult<Vec<u8>> {
    let mut encoder = device.create_command_encoder(&Default::default());
    encoder.copy_buffer_to_buffer(src, 0, staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|_| ComputeError::ExecutionFailed("Map channel closed".into()))?
        .map_err(|e| ComputeError::ExecutionFailed(format!("Map failed: {e}")))?;

    let data = slice.get_mapped_range();
    let result = data.to_vec();
    drop(data);
    staging.unmap();

    Ok(result)
}

// =============================================================================
// WgpuProbe
// =============================================================================

/// Capability probe backed by a real wgpu adapter.
///
/// Initialization requests an adapter and device once and keeps both alive
/// until [`destroy`](CapabilityProbe::destroy). Software rasterizers are
/// rejected unless the preferences allow fallback adapters.
pub struct WgpuProbe {
    device: Option<Arc<wgpu::Device>>,
    queue: Option<Arc<wgpu::Queue>>,
    ready: bool,
}

impl WgpuProbe {
    /// Probe with no device attached yet.
    pub fn new() -> Self {
        Self {
            device: None,
            queue: None,
            ready: false,
        }
    }

    /// Device handle, once a device has been acquired.
    pub fn device(&self) -> Option<Arc<wgpu::Device>> {
        self.device.clone()
    }

    /// Queue handle, once a device has been acquired.
    pub fn queue(&self) -> Option<Arc<wgpu::Queue>> {
        self.queue.clone()
    }

    /// Builds a ready tone curve executor on this probe's device.
    pub fn tone_curve(&self) -> ComputeResult<GpuToneCurve> {
        match (&self.device, &self.queue) {
            (Some(device), Some(queue)) => {
                let mut executor = GpuToneCurve::new(Arc::clone(device), Arc::clone(queue));
                executor.initialize();
                Ok(executor)
            }
            _ => Err(ComputeError::not_initialized("wgpu probe")),
        }
    }

    /// Builds a ready mask executor on this probe's device.
    pub fn mask_pipeline(&self) -> ComputeResult<GpuMaskPipeline> {
        match (&self.device, &self.queue) {
            (Some(device), Some(queue)) => {
                let mut executor = GpuMaskPipeline::new(Arc::clone(device), Arc::clone(queue));
                executor.initialize();
                Ok(executor)
            }
            _ => Err(ComputeError::not_initialized("wgpu probe")),
        }
    }
}

impl Default for WgpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProbe for WgpuProbe {
    async fn initialize(&mut self, prefs: &ProbePreferences) -> ComputeResult<Capabilities> {
        if prefs.force_disabled {
            self.device = None;
            self.queue = None;
            self.ready = true;
            return Ok(Capabilities::unavailable());
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if prefs.prefer_high_performance {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::LowPower
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ComputeError::NoAdapter)?;

        let info = adapter.get_info();
        if info.device_type == wgpu::DeviceType::Cpu && !prefs.allow_fallback_adapter {
            return Err(ComputeError::NoAdapter);
        }

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("darkroom_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| ComputeError::DeviceCreation(e.to_string()))?;

        self.device = Some(Arc::new(device));
        self.queue = Some(Arc::new(queue));
        self.ready = true;

        let limits = DeviceLimits {
            max_texture_dimension: adapter_limits.max_texture_dimension_2d,
            max_buffer_bytes: adapter_limits.max_buffer_size,
            max_workgroup_size: [
                adapter_limits.max_compute_workgroup_size_x,
                adapter_limits.max_compute_workgroup_size_y,
                adapter_limits.max_compute_workgroup_size_z,
            ],
            max_workgroups_per_dimension: adapter_limits.max_compute_workgroups_per_dimension,
        };

        let device_type = match info.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            _ => "other",
        };

        Ok(Capabilities {
            available: true,
            limits,
            adapter: Some(AdapterProfile {
                name: info.name,
                backend: info.backend.to_str().to_string(),
                device_type: device_type.to_string(),
            }),
        })
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn destroy(&mut self) {
        self.device = None;
        self.queue = None;
        self.ready = false;
    }
}

// =============================================================================
// Tone Curve Executor
// =============================================================================

/// Compute executor for 256-entry tone curve remaps.
///
/// Owns one pipeline and a buffer pool. Image and staging buffers are
/// pooled by size and usage; curve tables and dims uniforms are small
/// enough to upload fresh on every call.
pub struct GpuToneCurve {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: Option<wgpu::ComputePipeline>,
    buffers: ResourcePool<BufferKey, wgpu::Buffer>,
}

impl GpuToneCurve {
    /// Executor with no pipeline compiled yet.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            pipeline: None,
            buffers: ResourcePool::new(),
        }
    }

    /// Compiles the compute pipeline. Idempotent.
    pub fn initialize(&mut self) {
        if self.pipeline.is_none() {
            self.pipeline = Some(create_pipeline(
                &self.device,
                shaders::TONE_CURVE,
                "tone_curve_pipeline",
            ));
        }
    }

    /// Whether the pipeline is live.
    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Buffer pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.buffers.stats()
    }

    /// Remaps every color channel of an RGBA8 image through `curve`.
    ///
    /// Alpha passes through untouched.
    pub fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        curve: &ToneCurve,
    ) -> ComputeResult<Vec<u8>> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| ComputeError::not_initialized("tone curve executor"))?;
        check_rgba_len(pixels, width, height)?;

        let size = pixels.len() as u64;
        if size == 0 {
            return Ok(Vec::new());
        }

        let src = pooled_buffer(
            &self.device,
            &mut self.buffers,
            "tone_curve_src",
            BufferKey::upload(size),
        );
        let dst = pooled_buffer(
            &self.device,
            &mut self.buffers,
            "tone_curve_dst",
            BufferKey::readback(size),
        );
        let staging = pooled_buffer(
            &self.device,
            &mut self.buffers,
            "tone_curve_staging",
            BufferKey::staging(size),
        );

        self.queue.write_buffer(&src, 0, pixels);

        let table: Vec<u32> = curve.table().iter().map(|&v| u32::from(v)).collect();
        let curve_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tone_curve_table"),
            contents: bytemuck::cast_slice(&table),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let dims_buf = dims_buffer(&self.device, width, height);

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tone_curve_bind_group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: dims_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: curve_buf.as_entire_binding(),
                },
            ],
        });

        dispatch(
            &self.device,
            &self.queue,
            pipeline,
            &bind_group,
            DispatchGrid::for_output(width, height),
        );
        let result = read_back(&self.device, &self.queue, &dst, &staging, size)?;

        self.buffers.release(BufferKey::upload(size), src);
        self.buffers.release(BufferKey::readback(size), dst);
        self.buffers.release(BufferKey::staging(size), staging);

        Ok(result)
    }

    /// Drops the pipeline and every pooled buffer.
    pub fn destroy(&mut self) {
        self.pipeline = None;
        self.buffers.clear();
    }
}

// =============================================================================
// Mask Executor
// =============================================================================

/// Compute executor for mask-stack blends.
///
/// Each enabled mask is one full-image pass blending the running result
/// toward the adjusted image, ping-ponging between two pooled buffers.
pub struct GpuMaskPipeline {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: Option<wgpu::ComputePipeline>,
    buffers: ResourcePool<BufferKey, wgpu::Buffer>,
}

impl GpuMaskPipeline {
    /// Executor with no pipeline compiled yet.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            pipeline: None,
            buffers: ResourcePool::new(),
        }
    }

    /// Compiles the compute pipeline. Idempotent.
    pub fn initialize(&mut self) {
        if self.pipeline.is_none() {
            self.pipeline = Some(create_pipeline(
                &self.device,
                shaders::MASK_BLEND,
                "mask_blend_pipeline",
            ));
        }
    }

    /// Whether the pipeline is live.
    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Buffer pool counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.buffers.stats()
    }

    /// Blends `base` toward `adjusted` under each enabled mask in order.
    ///
    /// With no enabled masks the base image is returned unchanged.
    pub fn apply(
        &mut self,
        base: &[u8],
        adjusted: &[u8],
        width: u32,
        height: u32,
        masks: &[Mask],
    ) -> ComputeResult<Vec<u8>> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| ComputeError::not_initialized("mask executor"))?;
        check_rgba_len(base, width, height)?;
        check_rgba_len(adjusted, width, height)?;

        let size = base.len() as u64;
        if size == 0 || !masks.iter().any(|m| m.enabled) {
            return Ok(base.to_vec());
        }

        let adjusted_buf = pooled_buffer(
            &self.device,
            &mut self.buffers,
            "mask_adjusted",
            BufferKey::upload(size),
        );
        let staging = pooled_buffer(
            &self.device,
            &mut self.buffers,
            "mask_staging",
            BufferKey::staging(size),
        );
        let key = BufferKey::ping_pong(size);
        let front = pooled_buffer(&self.device, &mut self.buffers, "mask_ping", key);
        let back = pooled_buffer(&self.device, &mut self.buffers, "mask_pong", key);
        let mut chain = DoubleBuffered::new(front, back);

        self.queue.write_buffer(chain.current(), 0, base);
        self.queue.write_buffer(&adjusted_buf, 0, adjusted);

        let grid = DispatchGrid::for_output(width, height);
        let layout = pipeline.get_bind_group_layout(0);

        for mask in masks.iter().filter(|m| m.enabled) {
            let uniform = MaskUniform::new(mask, width, height);
            let mask_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mask_uniform"),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mask_bind_group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: chain.current().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: adjusted_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: chain.next().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: mask_buf.as_entire_binding(),
                    },
                ],
            });

            dispatch(&self.device, &self.queue, pipeline, &bind_group, grid);
            chain.swap();
        }

        let result = read_back(&self.device, &self.queue, chain.current(), &staging, size)?;

        let (front, back) = chain.into_inner();
        self.buffers.release(key, front);
        self.buffers.release(key, back);
        self.buffers.release(BufferKey::upload(size), adjusted_buf);
        self.buffers.release(BufferKey::staging(size), staging);

        Ok(result)
    }

    /// Drops the pipeline and every pooled buffer.
    pub fn destroy(&mut self) {
        self.pipeline = None;
        self.buffers.clear();
    }
}
