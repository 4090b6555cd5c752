//! GPU collaborator for the oblique pipeline.
//!
//! The pipeline itself is CPU-only; this crate supplies the pieces that
//! talk to the GPU through `wgpu`:
//!
//! - [`GpuContext`]: headless instance/adapter/device/queue bundle
//! - [`ComputeCuller`]: the asynchronous frustum + hierarchical-Z culling
//!   dispatch behind the pipeline's `GpuCuller` trait
//! - [`DepthPyramid`]: the max-depth mip chain the occlusion test samples
//! - [`blend`]: mapping of pipeline blend modes onto `wgpu::BlendState`

pub mod blend;
pub mod capability;
pub mod culler;
pub mod depth_pyramid;

pub use blend::{to_blend_state, to_color_target_state};
pub use capability::supports_gpu_culling;
pub use culler::ComputeCuller;
pub use depth_pyramid::DepthPyramid;

use std::sync::Arc;

/// GPU layer initialization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// No suitable adapter on this system.
    NoAdapter,
    /// Device creation was refused.
    DeviceCreation(String),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no suitable GPU adapter found"),
            Self::DeviceCreation(msg) => write!(f, "device creation failed: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {}

/// A headless graphics context: the culling dispatch needs a device and a
/// queue, never a surface.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a context synchronously.
    ///
    /// See [`GpuContext::new`] for the asynchronous version.
    pub fn new_sync() -> Result<Arc<Self>, GpuError> {
        pollster::block_on(Self::new())
    }

    /// Create a context asynchronously.
    pub async fn new() -> Result<Arc<Self>, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuError::NoAdapter)?;

        tracing::info!(adapter = %adapter.get_info().name, "GPU culling adapter selected");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("oblique_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        Ok(Arc::new(Self {
            instance,
            adapter,
            device,
            queue,
        }))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_error_display() {
        assert!(format!("{}", GpuError::NoAdapter).contains("adapter"));
        assert!(
            format!("{}", GpuError::DeviceCreation("limits".into())).contains("limits")
        );
    }
}
