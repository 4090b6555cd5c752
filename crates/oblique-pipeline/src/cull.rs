//! Frustum/occlusion culling.
//!
//! The CPU path tests candidate bounds against the six frustum planes four
//! objects at a time, with a scalar tail. The GPU path is a collaborator
//! behind the [`GpuCuller`] trait: a compute dispatch that performs the
//! same frustum test plus a hierarchical-Z occlusion test and writes a
//! visible-index buffer. The two paths must agree on frustum semantics; the
//! GPU path may additionally remove occluded objects, never add visible
//! ones the CPU path would reject.

use glam::Vec4;

use crate::descriptor::RenderableDescriptor;
use crate::frustum::Frustum;

/// Outcome counters for one culling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullCounts {
    /// Candidates examined.
    pub tested: u32,
    /// Candidates classified visible.
    pub visible: u32,
    /// Candidates rejected by the plane tests.
    pub culled: u32,
    /// Candidates with non-finite positions, excluded and reported.
    pub invalid: u32,
}

/// CPU frustum culling over the whole candidate array.
///
/// Appends visible candidate indices to `visible` in submission order.
/// Objects exactly on a plane (signed distance zero) are visible; objects
/// with NaN/infinite positions are excluded and counted as invalid rather
/// than culled, and never reach the sorter.
pub fn cull_cpu(
    descriptors: &[RenderableDescriptor],
    frustum: &Frustum,
    visible: &mut Vec<u32>,
) -> CullCounts {
    let mut counts = CullCounts {
        tested: descriptors.len() as u32,
        ..Default::default()
    };

    let chunks = descriptors.len() / 4;
    for c in 0..chunks {
        let d = &descriptors[c * 4..c * 4 + 4];

        let cx = Vec4::new(d[0].position.x, d[1].position.x, d[2].position.x, d[3].position.x);
        let cy = Vec4::new(d[0].position.y, d[1].position.y, d[2].position.y, d[3].position.y);
        let cz = Vec4::new(d[0].position.z, d[1].position.z, d[2].position.z, d[3].position.z);
        let ex = Vec4::new(
            d[0].half_extents.x,
            d[1].half_extents.x,
            d[2].half_extents.x,
            d[3].half_extents.x,
        );
        let ey = Vec4::new(
            d[0].half_extents.y,
            d[1].half_extents.y,
            d[2].half_extents.y,
            d[3].half_extents.y,
        );
        let ez = Vec4::new(
            d[0].half_extents.z,
            d[1].half_extents.z,
            d[2].half_extents.z,
            d[3].half_extents.z,
        );

        let finite = cx.is_finite_mask()
            & cy.is_finite_mask()
            & cz.is_finite_mask()
            & ex.is_finite_mask()
            & ey.is_finite_mask()
            & ez.is_finite_mask();

        // Plane loop over four lanes: signed distance of the box center
        // plus the box's projected radius, inclusive at zero.
        let mut inside = finite;
        for plane in &frustum.planes {
            let dist = cx * Vec4::splat(plane.normal.x)
                + cy * Vec4::splat(plane.normal.y)
                + cz * Vec4::splat(plane.normal.z)
                + Vec4::splat(plane.d);
            let radius = ex * Vec4::splat(plane.normal.x.abs())
                + ey * Vec4::splat(plane.normal.y.abs())
                + ez * Vec4::splat(plane.normal.z.abs());
            inside &= (dist + radius).cmpge(Vec4::ZERO);
        }

        for lane in 0..4 {
            if !finite.test(lane) {
                counts.invalid += 1;
            } else if inside.test(lane) {
                visible.push((c * 4 + lane) as u32);
                counts.visible += 1;
            } else {
                counts.culled += 1;
            }
        }
    }

    for i in chunks * 4..descriptors.len() {
        let desc = &descriptors[i];
        if !desc.has_finite_position() {
            counts.invalid += 1;
        } else if frustum.intersects_box(desc.position, desc.half_extents) {
            visible.push(i as u32);
            counts.visible += 1;
        } else {
            counts.culled += 1;
        }
    }

    counts
}

/// A completed GPU culling result.
///
/// Unlike the CPU path, index order is unspecified (the GPU compaction is
/// atomic-append); the depth sorter makes the final order deterministic
/// either way.
#[derive(Debug, Clone)]
pub struct GpuCullOutput {
    /// Frame number the dispatch was submitted for.
    pub frame: u64,
    /// Visible candidate indices.
    pub visible: Vec<u32>,
}

/// GPU culling failure; callers fall back to the CPU path on any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCullError {
    /// The device lacks compute support.
    Unsupported,
    /// Too many candidates for the configured buffer capacity.
    CapacityExceeded { candidates: usize, capacity: usize },
    /// Dispatch or readback failed.
    Readback(String),
}

impl std::fmt::Display for GpuCullError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported => write!(f, "GPU culling unsupported on this device"),
            Self::CapacityExceeded { candidates, capacity } => {
                write!(f, "{candidates} candidates exceed GPU culling capacity {capacity}")
            }
            Self::Readback(msg) => write!(f, "GPU culling readback failed: {msg}"),
        }
    }
}

impl std::error::Error for GpuCullError {}

/// Asynchronous GPU culling collaborator.
///
/// Contract: results for frame `F` are never returned before the dispatch
/// for `F` completed on the GPU. [`try_take`](Self::try_take) is
/// non-blocking and used by the pipelined mode (consuming the previous
/// frame's result); [`wait`](Self::wait) is the same-frame fence.
pub trait GpuCuller {
    /// Record and submit a culling dispatch for `frame`.
    fn submit(
        &mut self,
        descriptors: &[RenderableDescriptor],
        frustum: &Frustum,
        frame: u64,
    ) -> Result<(), GpuCullError>;

    /// Take the newest completed output with `output.frame >= min_frame`,
    /// without blocking.
    fn try_take(&mut self, min_frame: u64) -> Option<GpuCullOutput>;

    /// Block until the output for exactly `frame` is available.
    fn wait(&mut self, frame: u64) -> Result<GpuCullOutput, GpuCullError>;
}
