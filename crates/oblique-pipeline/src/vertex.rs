//! Vertex and index generation for finalized batches.
//!
//! Each batch member expands to one screen-space quad: four interleaved
//! vertices and six indices. Unrotated members (the overwhelming majority
//! of iso tiles) are expanded four quads at a time with lane-parallel
//! corner math; rotated members take the scalar path through the
//! polynomial sin/cos, never `f32::sin_cos`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};
use oblique_core::math::fast_sin_cos;
use static_assertions::const_assert_eq;

use crate::batch::Batch;
use crate::descriptor::{DescriptorFlags, RenderableDescriptor};
use crate::tile_mask::project_screen_rect;

/// Interleaved vertex record consumed by the draw submission layer.
///
/// `position.z` carries the isometric depth so the submission layer can
/// optionally enable a depth test; painter's order alone is sufficient
/// without one.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    /// Packed RGBA8 tint.
    pub color: u32,
}

const_assert_eq!(std::mem::size_of::<SpriteVertex>(), 24);

pub const VERTICES_PER_QUAD: u32 = 4;
pub const INDICES_PER_QUAD: u32 = 6;

/// Emit geometry for every batch, filling the frame vertex/index buffers
/// and stamping each batch's buffer offsets.
///
/// Member order inside a batch is paint order; index order follows it, so
/// a single draw per batch composites correctly.
pub fn emit_geometry(
    batches: &mut [Batch],
    descriptors: &[RenderableDescriptor],
    view_projection: &Mat4,
    viewport: Vec2,
    height_factor: f32,
    vertices: &mut Vec<SpriteVertex>,
    indices: &mut Vec<u32>,
) {
    for batch in batches.iter_mut() {
        batch.vertex_offset = vertices.len() as u32;
        batch.index_offset = indices.len() as u32;

        let members = &batch.members;
        let chunks = members.len() / 4;

        for c in 0..chunks {
            let quad = &members[c * 4..c * 4 + 4];
            if quad
                .iter()
                .any(|m| descriptors[m.index as usize].flags.contains(DescriptorFlags::ROTATED))
            {
                for m in quad {
                    emit_quad(&descriptors[m.index as usize], view_projection, viewport, height_factor, vertices, indices);
                }
                continue;
            }

            // Four unrotated quads at once: corner coordinates are just
            // lane-wise min/max selections over the projected rects.
            let mut min_x = [0.0f32; 4];
            let mut min_y = [0.0f32; 4];
            let mut max_x = [0.0f32; 4];
            let mut max_y = [0.0f32; 4];
            let mut depth = [0.0f32; 4];
            for (lane, m) in quad.iter().enumerate() {
                let d = &descriptors[m.index as usize];
                let (lo, hi) =
                    project_screen_rect(d.aabb_min(), d.aabb_max(), view_projection, viewport);
                min_x[lane] = lo.x;
                min_y[lane] = lo.y;
                max_x[lane] = hi.x;
                max_y[lane] = hi.y;
                depth[lane] = d.position.x + d.position.y + d.position.z * height_factor;
            }
            let (min_x, min_y) = (Vec4::from_array(min_x), Vec4::from_array(min_y));
            let (max_x, max_y) = (Vec4::from_array(max_x), Vec4::from_array(max_y));

            for lane in 0..4 {
                let d = &descriptors[quad[lane].index as usize];
                let (uv_min, uv_max) = flipped_uvs(d);
                push_quad_vertices(
                    [
                        Vec2::new(min_x[lane], min_y[lane]),
                        Vec2::new(max_x[lane], min_y[lane]),
                        Vec2::new(min_x[lane], max_y[lane]),
                        Vec2::new(max_x[lane], max_y[lane]),
                    ],
                    depth[lane],
                    uv_min,
                    uv_max,
                    d.color,
                    vertices,
                    indices,
                );
            }
        }

        for m in &members[chunks * 4..] {
            emit_quad(&descriptors[m.index as usize], view_projection, viewport, height_factor, vertices, indices);
        }

        batch.index_count = indices.len() as u32 - batch.index_offset;
    }
}

/// Scalar quad expansion, handling rotation and flips.
fn emit_quad(
    desc: &RenderableDescriptor,
    view_projection: &Mat4,
    viewport: Vec2,
    height_factor: f32,
    vertices: &mut Vec<SpriteVertex>,
    indices: &mut Vec<u32>,
) {
    let (lo, hi) = project_screen_rect(desc.aabb_min(), desc.aabb_max(), view_projection, viewport);
    let depth = desc.position.x + desc.position.y + desc.position.z * height_factor;
    let (uv_min, uv_max) = flipped_uvs(desc);

    let corners = if desc.flags.contains(DescriptorFlags::ROTATED) {
        let center = (lo + hi) * 0.5;
        let half = (hi - lo) * 0.5;
        let (sin, cos) = fast_sin_cos(desc.rotation);
        let rotate = |p: Vec2| {
            Vec2::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos) + center
        };
        [
            rotate(Vec2::new(-half.x, -half.y)),
            rotate(Vec2::new(half.x, -half.y)),
            rotate(Vec2::new(-half.x, half.y)),
            rotate(Vec2::new(half.x, half.y)),
        ]
    } else {
        [
            Vec2::new(lo.x, lo.y),
            Vec2::new(hi.x, lo.y),
            Vec2::new(lo.x, hi.y),
            Vec2::new(hi.x, hi.y),
        ]
    };

    push_quad_vertices(corners, depth, uv_min, uv_max, desc.color, vertices, indices);
}

fn flipped_uvs(desc: &RenderableDescriptor) -> (Vec2, Vec2) {
    let mut uv_min = desc.uv_min;
    let mut uv_max = desc.uv_max;
    if desc.flags.contains(DescriptorFlags::FLIP_X) {
        std::mem::swap(&mut uv_min.x, &mut uv_max.x);
    }
    if desc.flags.contains(DescriptorFlags::FLIP_Y) {
        std::mem::swap(&mut uv_min.y, &mut uv_max.y);
    }
    (uv_min, uv_max)
}

/// Push one quad: corners ordered TL, TR, BL, BR; two CCW triangles.
fn push_quad_vertices(
    corners: [Vec2; 4],
    depth: f32,
    uv_min: Vec2,
    uv_max: Vec2,
    color: u32,
    vertices: &mut Vec<SpriteVertex>,
    indices: &mut Vec<u32>,
) {
    let base = vertices.len() as u32;
    let uvs = [
        Vec2::new(uv_min.x, uv_min.y),
        Vec2::new(uv_max.x, uv_min.y),
        Vec2::new(uv_min.x, uv_max.y),
        Vec2::new(uv_max.x, uv_max.y),
    ];
    for (corner, uv) in corners.iter().zip(uvs) {
        vertices.push(SpriteVertex {
            position: [corner.x, corner.y, depth],
            uv: [uv.x, uv.y],
            color,
        });
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
}
