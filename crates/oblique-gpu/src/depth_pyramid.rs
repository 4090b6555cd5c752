//! Hierarchical-Z (max-depth) pyramid.
//!
//! A mip chain of the depth buffer where each texel holds the farthest
//! depth of its region. The culling kernel samples one mip level sized to
//! an object's screen footprint; if the object's nearest depth is behind
//! the stored maximum, it is occluded. Up to eight mips are built; finer
//! levels cost bandwidth without improving cull rates for sprite-sized
//! objects.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use oblique_core::profiling::profile_function;

use crate::GpuContext;

/// Pyramid depth limit; 256x-downsampled is coarse enough.
pub const MAX_MIPS: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BuildUniform {
    src_size: [u32; 2],
    dst_size: [u32; 2],
}

/// Max-depth mip chain with its build pipelines.
pub struct DepthPyramid {
    context: Arc<GpuContext>,
    texture: wgpu::Texture,
    mip_views: Vec<wgpu::TextureView>,
    full_view: wgpu::TextureView,
    width: u32,
    height: u32,
    mip_count: u32,

    init_pipeline: wgpu::ComputePipeline,
    init_layout: wgpu::BindGroupLayout,
    reduce_pipeline: wgpu::ComputePipeline,
    reduce_layout: wgpu::BindGroupLayout,
    /// One uniform buffer per pass (mip 0 init + each reduction).
    uniform_buffers: Vec<wgpu::Buffer>,
}

impl DepthPyramid {
    pub fn new(context: Arc<GpuContext>, width: u32, height: u32) -> Self {
        let device = context.device();

        let init_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("depth_pyramid_init_shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("shaders/depth_pyramid_init.wgsl").into(),
            ),
        });
        let reduce_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("depth_pyramid_reduce_shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("shaders/depth_pyramid_reduce.wgsl").into(),
            ),
        });

        let init_layout = Self::build_layout(device, "depth_pyramid_init_layout", true);
        let reduce_layout = Self::build_layout(device, "depth_pyramid_reduce_layout", false);

        let init_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_pyramid_init_pipeline_layout"),
            bind_group_layouts: &[&init_layout],
            push_constant_ranges: &[],
        });
        let init_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("depth_pyramid_init_pipeline"),
            layout: Some(&init_pipeline_layout),
            module: &init_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let reduce_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("depth_pyramid_reduce_pipeline_layout"),
                bind_group_layouts: &[&reduce_layout],
                push_constant_ranges: &[],
            });
        let reduce_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("depth_pyramid_reduce_pipeline"),
            layout: Some(&reduce_pipeline_layout),
            module: &reduce_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let (texture, mip_views, full_view, mip_count) =
            Self::create_chain(device, width, height);

        let uniform_buffers = (0..mip_count)
            .map(|_| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("depth_pyramid_build_uniform"),
                    size: std::mem::size_of::<BuildUniform>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        Self {
            context,
            texture,
            mip_views,
            full_view,
            width,
            height,
            mip_count,
            init_pipeline,
            init_layout,
            reduce_pipeline,
            reduce_layout,
            uniform_buffers,
        }
    }

    fn build_layout(
        device: &wgpu::Device,
        label: &str,
        depth_source: bool,
    ) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &[
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
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: if depth_source {
                            wgpu::TextureSampleType::Depth
                        } else {
                            wgpu::TextureSampleType::Float { filterable: false }
                        },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::R32Float,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        })
    }

    fn create_chain(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, Vec<wgpu::TextureView>, wgpu::TextureView, u32) {
        let full_mips = 32 - width.max(height).leading_zeros();
        let mip_count = full_mips.min(MAX_MIPS).max(1);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_pyramid"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
            view_formats: &[],
        });

        let mip_views = (0..mip_count)
            .map(|mip| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("depth_pyramid_mip"),
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let full_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        (texture, mip_views, full_view, mip_count)
    }

    /// Recreate the chain for a new depth buffer size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        let (texture, mip_views, full_view, mip_count) =
            Self::create_chain(self.context.device(), width, height);
        self.texture = texture;
        self.mip_views = mip_views;
        self.full_view = full_view;
        self.width = width;
        self.height = height;

        if mip_count != self.mip_count {
            let device = self.context.device();
            self.uniform_buffers = (0..mip_count)
                .map(|_| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("depth_pyramid_build_uniform"),
                        size: std::mem::size_of::<BuildUniform>() as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })
                .collect();
            self.mip_count = mip_count;
        }
    }

    fn mip_size(&self, mip: u32) -> [u32; 2] {
        [
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
        ]
    }

    /// Record the full pyramid build from the given depth buffer view.
    ///
    /// The caller submits the encoder; the pyramid is valid once that
    /// submission completes on the GPU.
    pub fn record_build(&self, encoder: &mut wgpu::CommandEncoder, depth_view: &wgpu::TextureView) {
        profile_function!();
        let device = self.context.device();
        let queue = self.context.queue();

        for mip in 0..self.mip_count {
            let src_size = if mip == 0 {
                [self.width, self.height]
            } else {
                self.mip_size(mip - 1)
            };
            let uniform = BuildUniform {
                src_size,
                dst_size: self.mip_size(mip),
            };
            queue.write_buffer(&self.uniform_buffers[mip as usize], 0, bytemuck::bytes_of(&uniform));

            let (pipeline, layout, source) = if mip == 0 {
                (&self.init_pipeline, &self.init_layout, depth_view)
            } else {
                (
                    &self.reduce_pipeline,
                    &self.reduce_layout,
                    &self.mip_views[(mip - 1) as usize],
                )
            };

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("depth_pyramid_build_bind_group"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniform_buffers[mip as usize].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(source),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(
                            &self.mip_views[mip as usize],
                        ),
                    },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("depth_pyramid_build_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let [w, h] = self.mip_size(mip);
            pass.dispatch_workgroups(w.div_ceil(8), h.div_ceil(8), 1);
        }
    }

    /// Full-chain view for the culling kernel.
    pub fn full_view(&self) -> &wgpu::TextureView {
        &self.full_view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}
