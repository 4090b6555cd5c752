//! Greedy screen-tile batch construction.
//!
//! Walks the depth-sorted visible sequence once and groups objects into
//! draw batches keyed by (texture, blend mode). Joining an existing batch
//! requires screen-tile overlap with that batch, keeping batches spatially
//! coherent for TBDR tile memory.
//!
//! Paint order is protected at pixel-rect granularity: an object may join
//! an older batch only if no batch opened since then actually intersects
//! the object's screen rectangle. The coarse tile buckets are far too
//! conservative for this test (a grid of abutting iso tiles shares
//! buckets everywhere while overlapping nowhere), so batches track exact
//! member bounds alongside their tile masks.

use glam::{Mat4, Vec2};

use crate::config::PipelineConfig;
use crate::depth::DepthEntry;
use crate::descriptor::{BlendMode, RenderableDescriptor, TextureId};
use crate::tile_mask::{ScreenTileMask, project_screen_rect};

/// Strict rectangle intersection; rectangles that merely share an edge do
/// not intersect (abutting grid tiles must not block each other).
#[inline]
pub(crate) fn rects_intersect(a_min: Vec2, a_max: Vec2, b_min: Vec2, b_max: Vec2) -> bool {
    a_min.x < b_max.x && b_min.x < a_max.x && a_min.y < b_max.y && b_min.y < a_max.y
}

/// One descriptor's membership record inside a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchMember {
    /// Descriptor index.
    pub index: u32,
    /// Screen-tile mask of this member alone.
    pub mask: ScreenTileMask,
    /// Screen-space rect, minimum corner.
    pub rect_min: Vec2,
    /// Screen-space rect, maximum corner.
    pub rect_max: Vec2,
    /// GPU instances this member expands to.
    pub instances: u32,
}

/// A set of renderables submitted as one draw call.
#[derive(Debug, Clone)]
pub struct Batch {
    pub texture: TextureId,
    pub blend: BlendMode,
    /// Members in paint order.
    pub members: Vec<BatchMember>,
    /// Union of all member masks.
    pub mask: ScreenTileMask,
    /// Union screen rect of all members, minimum corner.
    pub bounds_min: Vec2,
    /// Union screen rect of all members, maximum corner.
    pub bounds_max: Vec2,
    /// Total GPU instances across members.
    pub instances: u32,
    /// First vertex in the frame vertex buffer (set during emission).
    pub vertex_offset: u32,
    /// First index in the frame index buffer (set during emission).
    pub index_offset: u32,
    /// Indices to draw (set during emission).
    pub index_count: u32,
    /// Creation sequence number; batches that intersect on screen must
    /// draw in this order.
    pub order: u32,
    /// Set by the optimizer on split halves. Sealed batches never merge
    /// again; without this, merge and split would undo each other.
    pub sealed: bool,
}

impl Batch {
    pub fn new(texture: TextureId, blend: BlendMode, order: u32) -> Self {
        Self {
            texture,
            blend,
            members: Vec::new(),
            mask: ScreenTileMask::EMPTY,
            bounds_min: Vec2::splat(f32::MAX),
            bounds_max: Vec2::splat(f32::MIN),
            instances: 0,
            vertex_offset: 0,
            index_offset: 0,
            index_count: 0,
            order,
            sealed: false,
        }
    }

    /// The state key two descriptors must share to ride one draw call.
    #[inline]
    pub fn key(&self) -> (TextureId, BlendMode) {
        (self.texture, self.blend)
    }

    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether this batch's pixels intersect the given rect.
    #[inline]
    pub fn intersects_rect(&self, rect_min: Vec2, rect_max: Vec2) -> bool {
        !self.is_empty() && rects_intersect(self.bounds_min, self.bounds_max, rect_min, rect_max)
    }

    /// Whether two batches intersect on screen.
    #[inline]
    pub fn intersects(&self, other: &Batch) -> bool {
        other.intersects_rect(self.bounds_min, self.bounds_max) && !self.is_empty()
    }

    pub fn push_member(&mut self, member: BatchMember) {
        self.mask = self.mask.union(&member.mask);
        self.bounds_min = self.bounds_min.min(member.rect_min);
        self.bounds_max = self.bounds_max.max(member.rect_max);
        self.instances += member.instances;
        self.members.push(member);
    }

    /// Recompute union mask, bounds and instance total from the member
    /// list; needed after the optimizer moves members around.
    pub fn recompute_totals(&mut self) {
        self.mask = ScreenTileMask::EMPTY;
        self.bounds_min = Vec2::splat(f32::MAX);
        self.bounds_max = Vec2::splat(f32::MIN);
        self.instances = 0;
        for m in &self.members {
            self.mask = self.mask.union(&m.mask);
            self.bounds_min = self.bounds_min.min(m.rect_min);
            self.bounds_max = self.bounds_max.max(m.rect_max);
            self.instances += m.instances;
        }
    }
}

/// Counters reported by the builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchBuildCounts {
    /// Objects dropped because the batch array was exhausted.
    pub dropped: u32,
}

/// Build raw batches from the depth-ordered visible sequence.
///
/// Single greedy pass, order preserving. For each object the open batches
/// are scanned newest-first:
///
/// - a batch with the same (texture, blend) key, room, and tile-mask
///   overlap takes the object;
/// - a batch whose pixels intersect the object's rect stops the scan; the
///   object may not be drawn before that batch, so it opens a new one;
/// - anything else is skipped.
///
/// An object overlapping no open batch opens a new batch even when an
/// older batch shares its texture (spatial locality for tile memory).
///
/// When `config.max_batches` is reached, objects that would need a new
/// batch are dropped and counted; memory is never overrun.
pub fn build_batches(
    descriptors: &[RenderableDescriptor],
    ordered: &[DepthEntry],
    view_projection: &Mat4,
    viewport: Vec2,
    config: &PipelineConfig,
    batches: &mut Vec<Batch>,
) -> BatchBuildCounts {
    let mut counts = BatchBuildCounts::default();

    for entry in ordered {
        let desc = &descriptors[entry.index as usize];
        let (rect_min, rect_max) =
            project_screen_rect(desc.aabb_min(), desc.aabb_max(), view_projection, viewport);
        let mask =
            ScreenTileMask::from_screen_rect(rect_min, rect_max, viewport, config.tile_size_px);
        let member = BatchMember {
            index: entry.index,
            mask,
            rect_min,
            rect_max,
            instances: desc.instance_count.max(1),
        };

        let mut joined = false;
        for batch in batches.iter_mut().rev() {
            if batch.texture == desc.texture
                && batch.blend == desc.blend
                && batch.member_count() < config.max_batch_size
                && batch.mask.overlaps(&mask)
            {
                batch.push_member(member);
                joined = true;
                break;
            }
            if batch.intersects_rect(rect_min, rect_max) {
                // Drawing into any older batch would put this object under
                // pixels it must cover.
                break;
            }
        }

        if !joined {
            if batches.len() >= config.max_batches {
                counts.dropped += 1;
                continue;
            }
            let mut batch = Batch::new(desc.texture, desc.blend, batches.len() as u32);
            batch.push_member(member);
            batches.push(batch);
        }
    }

    counts
}
