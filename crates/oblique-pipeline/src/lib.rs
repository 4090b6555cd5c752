//! Isometric visibility and draw-call optimization pipeline.
//!
//! Turns up to a million renderable descriptors per frame into a short,
//! ordered list of GPU-submittable batches:
//!
//! ```text
//! candidates -> [cull] -> visible -> [sort] -> ordered
//!            -> [batch] -> raw batches -> [optimize] -> final batches
//! ```
//!
//! | Stage | Module | Job |
//! |-------|--------|-----|
//! | Cull | [`cull`] | 6-plane frustum tests (4-wide SIMD), optional async GPU frustum+HZB path |
//! | Sort | [`depth`], [`sort`] | isometric depth keys, radix/quicksort, stable tie-breaks |
//! | Batch | [`tile_mask`], [`batch`] | greedy (texture, blend)-keyed grouping with screen-tile locality |
//! | Optimize | [`optimizer`] | merge/split/reorder under the draw-call ceiling |
//! | Emit | [`vertex`] | interleaved quad geometry per final batch |
//!
//! Everything runs single-threaded once per frame inside a
//! [`PipelineContext`]; the only asynchronous element is the GPU culling
//! collaborator behind [`cull::GpuCuller`].

pub mod batch;
pub mod config;
pub mod context;
pub mod cull;
pub mod depth;
pub mod descriptor;
pub mod frustum;
pub mod optimizer;
pub mod sort;
pub mod stats;
pub mod tile_mask;
pub mod vertex;

pub use batch::{Batch, BatchMember};
pub use config::{GpuCullMode, PipelineConfig};
pub use context::{FrameInputs, FrameOutput, PipelineContext};
pub use cull::{GpuCullError, GpuCullOutput, GpuCuller};
pub use descriptor::{BlendMode, DescriptorFlags, ObjectKind, RenderableDescriptor, TextureId};
pub use frustum::{Frustum, Plane};
pub use stats::FrameStats;
pub use tile_mask::ScreenTileMask;
pub use vertex::SpriteVertex;
