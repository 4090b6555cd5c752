//! Coarse screen-tile occupancy masks.
//!
//! TBDR hardware shades per 32x32-pixel tile out of on-chip memory, so the
//! batcher and optimizer reason about which tiles a batch touches. Tracking
//! every hardware tile individually would need thousands of bits at desktop
//! resolutions; instead the screen is bucketed into a fixed 16x8 grid of
//! tile groups and each object/batch carries one bit per bucket.

use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

/// Bucket grid columns.
pub const MASK_COLS: u32 = 16;
/// Bucket grid rows.
pub const MASK_ROWS: u32 = 8;
/// Total buckets (bits) in a mask.
pub const MASK_BUCKETS: u32 = MASK_COLS * MASK_ROWS;

/// Bits in bucket column 0 (guards left shifts across row boundaries).
const COL_FIRST: u128 = 0x0001_0001_0001_0001_0001_0001_0001_0001;
/// Bits in bucket column 15.
const COL_LAST: u128 = COL_FIRST << (MASK_COLS - 1);

/// Bitmask of the coarse screen-tile buckets an object or batch overlaps.
///
/// Bit `row * 16 + col` covers the bucket at `(col, row)`; a bucket spans
/// `ceil(tiles_x / 16)` x `ceil(tiles_y / 8)` hardware tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScreenTileMask {
    bits: u128,
}

impl ScreenTileMask {
    pub const EMPTY: Self = Self { bits: 0 };

    /// Rasterize a pixel-space rectangle into bucket bits.
    ///
    /// The rectangle is clamped to the viewport; a rectangle entirely off
    /// screen yields the empty mask. Degenerate (zero-area) rectangles that
    /// touch the screen still set the bucket under their origin.
    pub fn from_screen_rect(min: Vec2, max: Vec2, viewport: Vec2, tile_size: f32) -> Self {
        if viewport.x <= 0.0 || viewport.y <= 0.0 {
            return Self::EMPTY;
        }
        if max.x < 0.0 || max.y < 0.0 || min.x >= viewport.x || min.y >= viewport.y {
            return Self::EMPTY;
        }

        let min = min.max(Vec2::ZERO);
        let max = max.min(viewport);

        let tiles_x = (viewport.x / tile_size).ceil().max(1.0) as u32;
        let tiles_y = (viewport.y / tile_size).ceil().max(1.0) as u32;
        let tiles_per_bucket_x = tiles_x.div_ceil(MASK_COLS);
        let tiles_per_bucket_y = tiles_y.div_ceil(MASK_ROWS);

        // Tile span, exclusive upper bound.
        let t_min_x = (min.x / tile_size) as u32;
        let t_min_y = (min.y / tile_size) as u32;
        let t_max_x = ((max.x / tile_size).ceil() as u32).max(t_min_x + 1);
        let t_max_y = ((max.y / tile_size).ceil() as u32).max(t_min_y + 1);

        let b_min_x = (t_min_x / tiles_per_bucket_x).min(MASK_COLS - 1);
        let b_min_y = (t_min_y / tiles_per_bucket_y).min(MASK_ROWS - 1);
        let b_max_x = t_max_x.div_ceil(tiles_per_bucket_x).clamp(b_min_x + 1, MASK_COLS);
        let b_max_y = t_max_y.div_ceil(tiles_per_bucket_y).clamp(b_min_y + 1, MASK_ROWS);

        let mut bits = 0u128;
        for row in b_min_y..b_max_y {
            for col in b_min_x..b_max_x {
                bits |= 1u128 << (row * MASK_COLS + col);
            }
        }
        Self { bits }
    }

    /// Set the bit for a single bucket.
    #[inline]
    pub fn with_bucket(col: u32, row: u32) -> Self {
        debug_assert!(col < MASK_COLS && row < MASK_ROWS);
        Self {
            bits: 1u128 << (row * MASK_COLS + col),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Bitwise union with another mask.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Whether any bucket is shared with `other`.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.bits & other.bits != 0
    }

    /// Mask dilated by one bucket in the four cardinal directions.
    ///
    /// Used by the optimizer's adjacency predicate: two masks are adjacent
    /// when one overlaps the other's dilation.
    #[inline]
    pub fn expanded(&self) -> Self {
        let b = self.bits;
        let left = (b & !COL_FIRST) >> 1;
        let right = (b & !COL_LAST) << 1;
        let up = b >> MASK_COLS;
        let down = b << MASK_COLS;
        Self {
            bits: b | left | right | up | down,
        }
    }

    /// Index of the lowest set bucket; `MASK_BUCKETS` when empty.
    ///
    /// Batches sorted by this key walk the screen in bucket order, which
    /// keeps consecutive draw calls on nearby GPU tiles.
    #[inline]
    pub fn lowest_bucket(&self) -> u32 {
        self.bits.trailing_zeros()
    }

    /// Number of buckets covered.
    #[inline]
    pub fn coverage(&self) -> u32 {
        self.bits.count_ones()
    }

    /// The mask as two 64-bit words (low, high) for GPU upload.
    #[inline]
    pub fn words(&self) -> [u64; 2] {
        [self.bits as u64, (self.bits >> 64) as u64]
    }
}

/// Project a world-space box onto the screen and return its pixel rectangle.
///
/// All eight corners are transformed by the view-projection matrix; NDC is
/// mapped to pixels with y down. The caller clamps via
/// [`ScreenTileMask::from_screen_rect`].
pub fn project_screen_rect(
    aabb_min: Vec3,
    aabb_max: Vec3,
    view_projection: &Mat4,
    viewport: Vec2,
) -> (Vec2, Vec2) {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);

    for corner in 0..8u32 {
        let p = Vec3::new(
            if corner & 1 != 0 { aabb_max.x } else { aabb_min.x },
            if corner & 2 != 0 { aabb_max.y } else { aabb_min.y },
            if corner & 4 != 0 { aabb_max.z } else { aabb_min.z },
        );
        let clip = *view_projection * p.extend(1.0);
        let w = if clip.w.abs() > f32::EPSILON { clip.w } else { 1.0 };
        let ndc = clip.xyz() / w;
        let screen = Vec2::new(
            (ndc.x * 0.5 + 0.5) * viewport.x,
            (1.0 - (ndc.y * 0.5 + 0.5)) * viewport.y,
        );
        min = min.min(screen);
        max = max.max(screen);
    }

    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Vec2 = Vec2::new(1920.0, 1080.0);

    #[test]
    fn test_full_screen_rect_covers_every_used_bucket() {
        // 1920x1080 at 32px tiles is a 60x34 tile grid; buckets hold 4x5
        // tiles, so 15 columns and 7 rows of the 16x8 grid are in use.
        let mask = ScreenTileMask::from_screen_rect(Vec2::ZERO, VIEWPORT, VIEWPORT, 32.0);
        assert_eq!(mask.coverage(), 15 * 7);

        // Any on-screen rect must land inside the full-screen mask.
        let probe = ScreenTileMask::from_screen_rect(
            Vec2::new(1900.0, 1060.0),
            Vec2::new(1920.0, 1080.0),
            VIEWPORT,
            32.0,
        );
        assert_eq!(mask.union(&probe), mask);
    }

    #[test]
    fn test_small_rect_sets_one_bucket() {
        // 1920/32 = 60 tiles, 4 tiles (128px) per bucket column.
        let mask =
            ScreenTileMask::from_screen_rect(Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0), VIEWPORT, 32.0);
        assert_eq!(mask.coverage(), 1);
        assert_eq!(mask.lowest_bucket(), 0);
    }

    #[test]
    fn test_offscreen_rect_is_empty() {
        let mask = ScreenTileMask::from_screen_rect(
            Vec2::new(-200.0, 0.0),
            Vec2::new(-10.0, 50.0),
            VIEWPORT,
            32.0,
        );
        assert!(mask.is_empty());
    }

    #[test]
    fn test_union_is_bitwise() {
        let a = ScreenTileMask::with_bucket(0, 0);
        let b = ScreenTileMask::with_bucket(15, 7);
        let u = a.union(&b);
        assert!(u.overlaps(&a));
        assert!(u.overlaps(&b));
        assert_eq!(u.coverage(), 2);
    }

    #[test]
    fn test_expansion_stops_at_edges() {
        // A corner bucket dilates to 3 buckets, not wrapping around.
        let corner = ScreenTileMask::with_bucket(0, 0);
        assert_eq!(corner.expanded().coverage(), 3);

        let far_corner = ScreenTileMask::with_bucket(15, 7);
        assert_eq!(far_corner.expanded().coverage(), 3);

        // Row wrap guard: column 15 must not bleed into column 0 of the
        // next row.
        let edge = ScreenTileMask::with_bucket(15, 3);
        assert!(!edge.expanded().overlaps(&ScreenTileMask::with_bucket(0, 4)));
    }

    #[test]
    fn test_adjacency_via_expansion() {
        let a = ScreenTileMask::with_bucket(4, 4);
        let b = ScreenTileMask::with_bucket(5, 4);
        let c = ScreenTileMask::with_bucket(7, 4);
        assert!(!a.overlaps(&b));
        assert!(a.expanded().overlaps(&b));
        assert!(!a.expanded().overlaps(&c));
    }

    #[test]
    fn test_words_round_trip() {
        let m = ScreenTileMask::with_bucket(3, 0).union(&ScreenTileMask::with_bucket(0, 7));
        let [lo, hi] = m.words();
        assert_eq!(lo, 1 << 3);
        assert_eq!(hi, 1 << (7 * MASK_COLS - 64));
    }

    #[test]
    fn test_project_identity_center() {
        let vp = Mat4::IDENTITY;
        let (min, max) = project_screen_rect(
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(0.5, 0.5, 0.0),
            &vp,
            Vec2::new(100.0, 100.0),
        );
        assert!((min.x - 25.0).abs() < 1e-3);
        assert!((max.x - 75.0).abs() < 1e-3);
        assert!((min.y - 25.0).abs() < 1e-3);
        assert!((max.y - 75.0).abs() < 1e-3);
    }
}
