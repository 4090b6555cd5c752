//! Asynchronous compute culling dispatch.
//!
//! One thread per candidate tests the six frustum planes and, when a depth
//! pyramid is attached, a hierarchical-Z occlusion sample; survivors are
//! appended to a visible-index buffer through an atomic counter. Results
//! are copied to staging buffers and mapped asynchronously; the pipeline
//! either fences on them in the same frame or consumes them one frame
//! later, per its configured mode.

use std::sync::Arc;
use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use oblique_core::profiling::profile_function;
use oblique_pipeline::{Frustum, GpuCullError, GpuCullOutput, GpuCuller, RenderableDescriptor};

use crate::GpuContext;
use crate::depth_pyramid::DepthPyramid;

/// Candidate bounds in GPU layout (two padded vec4s).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuCandidate {
    center: [f32; 4],
    half_extents: [f32; 4],
}

/// Culling parameters (match `frustum_cull.wgsl`).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CullUniform {
    /// Six planes as (normal.xyz, d).
    planes: [[f32; 4]; 6],
    /// View-projection matrix for the occlusion footprint.
    view_proj: [[f32; 4]; 4],
    /// x: candidate count, y: occlusion enabled, z: pyramid mip count.
    params: [u32; 4],
    /// x, y: pyramid base dimensions.
    pyramid_size: [f32; 4],
}

struct Pending {
    frame: u64,
    count: usize,
    visible_rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    count_rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
    /// Mapping callbacks already observed (successfully) for each buffer.
    visible_done: bool,
    count_done: bool,
    /// A mapping callback reported failure; the result is unusable.
    failed: bool,
}

impl Pending {
    /// Drain whatever callback results have arrived without blocking.
    fn pump(&mut self) {
        if !self.visible_done {
            match self.visible_rx.try_recv() {
                Ok(Ok(())) => self.visible_done = true,
                Ok(Err(_)) => self.failed = true,
                Err(_) => {}
            }
        }
        if !self.count_done {
            match self.count_rx.try_recv() {
                Ok(Ok(())) => self.count_done = true,
                Ok(Err(_)) => self.failed = true,
                Err(_) => {}
            }
        }
    }

    /// Block until both callbacks have fired (the device must have been
    /// polled with `Wait` first).
    fn pump_blocking(&mut self) {
        if !self.visible_done {
            match self.visible_rx.recv() {
                Ok(Ok(())) => self.visible_done = true,
                _ => self.failed = true,
            }
        }
        if !self.count_done {
            match self.count_rx.recv() {
                Ok(Ok(())) => self.count_done = true,
                _ => self.failed = true,
            }
        }
    }

    fn ready(&self) -> bool {
        self.visible_done && self.count_done && !self.failed
    }
}

/// GPU implementation of the pipeline's `GpuCuller` collaborator.
pub struct ComputeCuller {
    context: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
    uniform_buffer: wgpu::Buffer,
    candidate_buffer: wgpu::Buffer,
    visible_buffer: wgpu::Buffer,
    counter_buffer: wgpu::Buffer,
    visible_staging: wgpu::Buffer,
    counter_staging: wgpu::Buffer,
    capacity: usize,
    upload: Vec<GpuCandidate>,
    pyramid: Option<PyramidBinding>,
    fallback_pyramid: wgpu::TextureView,
    view_proj: Mat4,
    pending: Option<Pending>,
}

struct PyramidBinding {
    view: wgpu::TextureView,
    mip_count: u32,
    width: u32,
    height: u32,
}

impl ComputeCuller {
    const INITIAL_CAPACITY: usize = 65_536;
    const WORKGROUP_SIZE: u32 = 64;

    pub fn new(context: Arc<GpuContext>) -> Self {
        let device = context.device();

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("frustum_cull_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/frustum_cull.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frustum_cull_bind_group_layout"),
            entries: &[
                // Culling uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Candidates (read)
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Visible indices (write)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Visible counter (atomic)
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Depth pyramid
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("frustum_cull_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("frustum_cull_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_uniform"),
            size: std::mem::size_of::<CullUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let counter_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_counter"),
            size: 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let counter_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_counter_staging"),
            size: 4,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let (candidate_buffer, visible_buffer, visible_staging) =
            Self::create_sized_buffers(device, Self::INITIAL_CAPACITY);

        // A 1x1 far-plane texture stands in while no pyramid is attached;
        // the shader skips the occlusion branch entirely in that case.
        let fallback_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frustum_cull_fallback_pyramid"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let fallback_pyramid = fallback_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            context,
            pipeline,
            bind_group_layout,
            bind_group: None,
            uniform_buffer,
            candidate_buffer,
            visible_buffer,
            counter_buffer,
            visible_staging,
            counter_staging,
            capacity: Self::INITIAL_CAPACITY,
            upload: Vec::new(),
            pyramid: None,
            fallback_pyramid,
            view_proj: Mat4::IDENTITY,
            pending: None,
        }
    }

    fn create_sized_buffers(
        device: &wgpu::Device,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::Buffer, wgpu::Buffer) {
        let candidate_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_candidates"),
            size: (capacity * std::mem::size_of::<GpuCandidate>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let visible_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_visible"),
            size: (capacity * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let visible_staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frustum_cull_visible_staging"),
            size: (capacity * 4) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        (candidate_buffer, visible_buffer, visible_staging)
    }

    fn ensure_capacity(&mut self, required: usize) {
        if required <= self.capacity {
            return;
        }
        let new_capacity = required.next_power_of_two();
        let (candidates, visible, staging) =
            Self::create_sized_buffers(self.context.device(), new_capacity);
        self.candidate_buffer = candidates;
        self.visible_buffer = visible;
        self.visible_staging = staging;
        self.capacity = new_capacity;
        self.bind_group = None;
    }

    /// Attach this frame's depth pyramid and camera for occlusion testing.
    ///
    /// Without this call the dispatch performs frustum culling only. The
    /// pyramid must have been built from a depth buffer of a previous (or
    /// the current) frame; stale pyramids are the documented bounded-error
    /// trade of the pipelined mode.
    pub fn prepare_occlusion(&mut self, view_projection: Mat4, pyramid: &DepthPyramid) {
        self.view_proj = view_projection;
        self.pyramid = Some(PyramidBinding {
            view: pyramid.full_view().clone(),
            mip_count: pyramid.mip_count(),
            width: pyramid.width(),
            height: pyramid.height(),
        });
        self.bind_group = None;
    }

    fn ensure_bind_group(&mut self) {
        if self.bind_group.is_some() {
            return;
        }
        let pyramid_view = self
            .pyramid
            .as_ref()
            .map(|p| &p.view)
            .unwrap_or(&self.fallback_pyramid);

        self.bind_group = Some(self.context.device().create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("frustum_cull_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.candidate_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.visible_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.counter_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(pyramid_view),
                    },
                ],
            },
        ));
    }

    fn uniform_for(&self, frustum: &Frustum, count: usize) -> CullUniform {
        let mut planes = [[0.0f32; 4]; 6];
        for (i, plane) in frustum.planes.iter().enumerate() {
            planes[i] = [plane.normal.x, plane.normal.y, plane.normal.z, plane.d];
        }
        let (occlusion, mips, width, height) = match &self.pyramid {
            Some(p) => (1, p.mip_count, p.width as f32, p.height as f32),
            None => (0, 1, 1.0, 1.0),
        };
        CullUniform {
            planes,
            view_proj: self.view_proj.to_cols_array_2d(),
            params: [count as u32, occlusion, mips, 0],
            pyramid_size: [width, height, 0.0, 0.0],
        }
    }

    /// Drop an unconsumed result so its staging buffers can be reused.
    fn discard_pending(&mut self) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        let _ = self.context.device().poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        pending.pump_blocking();
        if pending.visible_done {
            self.visible_staging.unmap();
        }
        if pending.count_done {
            self.counter_staging.unmap();
        }
        tracing::debug!(frame = pending.frame, "discarded unconsumed GPU culling result");
    }

    /// Read the mapped staging buffers and release them.
    fn collect(&mut self, pending: Pending) -> GpuCullOutput {
        let count = {
            let data = self.counter_staging.slice(..).get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&data);
            words[0] as usize
        };
        self.counter_staging.unmap();

        let count = count.min(pending.count);
        let visible = {
            let data = self
                .visible_staging
                .slice(..(pending.count * 4) as u64)
                .get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&data);
            words[..count].to_vec()
        };
        self.visible_staging.unmap();

        GpuCullOutput {
            frame: pending.frame,
            visible,
        }
    }
}

impl GpuCuller for ComputeCuller {
    fn submit(
        &mut self,
        descriptors: &[RenderableDescriptor],
        frustum: &Frustum,
        frame: u64,
    ) -> Result<(), GpuCullError> {
        profile_function!();
        self.discard_pending();
        self.ensure_capacity(descriptors.len());
        self.ensure_bind_group();

        self.upload.clear();
        self.upload.extend(descriptors.iter().map(|d| GpuCandidate {
            center: [d.position.x, d.position.y, d.position.z, 0.0],
            half_extents: [d.half_extents.x, d.half_extents.y, d.half_extents.z, 0.0],
        }));

        let device = self.context.device();
        let queue = self.context.queue();

        queue.write_buffer(&self.candidate_buffer, 0, bytemuck::cast_slice(&self.upload));
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniform_for(frustum, descriptors.len())),
        );
        queue.write_buffer(&self.counter_buffer, 0, &[0u8; 4]);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frustum_cull_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("frustum_cull_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, self.bind_group.as_ref().unwrap(), &[]);
            let workgroups = (descriptors.len() as u32).div_ceil(Self::WORKGROUP_SIZE);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.visible_buffer,
            0,
            &self.visible_staging,
            0,
            (descriptors.len() * 4) as u64,
        );
        encoder.copy_buffer_to_buffer(&self.counter_buffer, 0, &self.counter_staging, 0, 4);
        queue.submit(Some(encoder.finish()));

        let (visible_tx, visible_rx) = mpsc::channel();
        self.visible_staging
            .slice(..(descriptors.len() * 4) as u64)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = visible_tx.send(result);
            });
        let (count_tx, count_rx) = mpsc::channel();
        self.counter_staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = count_tx.send(result);
            });

        self.pending = Some(Pending {
            frame,
            count: descriptors.len(),
            visible_rx,
            count_rx,
            visible_done: false,
            count_done: false,
            failed: false,
        });
        Ok(())
    }

    fn try_take(&mut self, min_frame: u64) -> Option<GpuCullOutput> {
        if self.pending.as_ref()?.frame < min_frame {
            self.discard_pending();
            return None;
        }

        let _ = self.context.device().poll(wgpu::PollType::Poll);

        self.pending.as_mut()?.pump();
        if self.pending.as_ref()?.failed {
            self.discard_pending();
            return None;
        }
        if !self.pending.as_ref()?.ready() {
            return None;
        }

        let pending = self.pending.take()?;
        Some(self.collect(pending))
    }

    fn wait(&mut self, frame: u64) -> Result<GpuCullOutput, GpuCullError> {
        match &self.pending {
            Some(pending) if pending.frame == frame => {}
            _ => {
                return Err(GpuCullError::Readback(format!(
                    "no dispatch pending for frame {frame}"
                )));
            }
        }

        let _ = self.context.device().poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        let mut pending = self.pending.take().expect("pending checked above");
        pending.pump_blocking();
        if !pending.ready() {
            if pending.visible_done {
                self.visible_staging.unmap();
            }
            if pending.count_done {
                self.counter_staging.unmap();
            }
            return Err(GpuCullError::Readback("buffer mapping failed".into()));
        }

        Ok(self.collect(pending))
    }
}
