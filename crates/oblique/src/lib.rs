//! Oblique: an isometric visibility and draw-call optimization pipeline.
//!
//! Oblique turns very large per-frame sets of isometric tile/sprite
//! descriptors (up to ~1M) into a short, ordered list of GPU draw batches
//! that fits a strict draw-call budget on tile-based-deferred-rendering
//! hardware:
//!
//! - **Culling**: SIMD frustum tests on the CPU, or an asynchronous
//!   frustum + hierarchical-Z compute dispatch for very large counts
//! - **Depth sorting**: stable painter's ordering from an isometric depth
//!   key, radix-sorted at scale
//! - **Batching**: greedy (texture, blend)-keyed grouping aware of 32x32
//!   GPU screen tiles
//! - **Optimization**: batch merge/split/reorder under the draw-call
//!   ceiling, with every violation observable in frame statistics
//!
//! # Quick Start
//!
//! ```
//! use oblique::prelude::*;
//! use oblique::glam::{Mat4, Vec2, Vec3};
//!
//! let mut ctx = PipelineContext::new(PipelineConfig::default());
//!
//! let descriptors = vec![RenderableDescriptor {
//!     position: Vec3::new(10.0, 20.0, 0.0),
//!     texture: TextureId(3),
//!     ..Default::default()
//! }];
//!
//! let inputs = FrameInputs::from_camera(
//!     Mat4::orthographic_rh(-960.0, 960.0, -540.0, 540.0, 0.0, 1000.0),
//!     Vec2::new(1920.0, 1080.0),
//!     0,
//! );
//!
//! let output = ctx.run(&descriptors, &inputs);
//! assert_eq!(output.stats.visible, 1);
//! ```
//!
//! The GPU collaborator (`gpu` feature, on by default) provides the
//! compute culler and depth pyramid; the pipeline itself never touches a
//! GPU API and is fully testable headless.

pub use oblique_core as core;
pub use oblique_pipeline as pipeline;

#[cfg(feature = "gpu")]
pub use oblique_gpu as gpu;

/// Re-export of the math crate used throughout the public API.
pub use oblique_core::math::fast as glam;

/// The types most applications need.
pub mod prelude {
    pub use oblique_pipeline::{
        Batch, BlendMode, DescriptorFlags, FrameInputs, FrameStats, Frustum, GpuCullMode,
        ObjectKind, PipelineConfig, PipelineContext, RenderableDescriptor, ScreenTileMask,
        SpriteVertex, TextureId,
    };

    #[cfg(feature = "gpu")]
    pub use oblique_gpu::{ComputeCuller, DepthPyramid, GpuContext};
}
