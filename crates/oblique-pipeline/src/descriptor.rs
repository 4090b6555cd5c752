//! Renderable descriptors produced by the world/simulation layer.
//!
//! A [`RenderableDescriptor`] is the read-only input record for one
//! tile/sprite. The simulation fills an array of these each frame; the
//! pipeline never mutates them.

use glam::{Vec2, Vec3};

bitflags::bitflags! {
    /// Per-descriptor draw flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorFlags: u32 {
        /// Quad corners are rotated by [`RenderableDescriptor::rotation`].
        const ROTATED = 1 << 0;
        /// Mirror the sprite horizontally (swap U coordinates).
        const FLIP_X = 1 << 1;
        /// Mirror the sprite vertically (swap V coordinates).
        const FLIP_Y = 1 << 2;
    }
}

/// Stable identifier of a texture atlas page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Blend modes understood by the draw submission layer.
///
/// Part of the batch key: two descriptors can only share a draw call when
/// both texture id and blend mode match. The mapping to concrete GPU blend
/// state lives in the GPU crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending; source replaces destination.
    #[default]
    Opaque,
    /// Standard alpha blending.
    Alpha,
    /// Premultiplied alpha compositing.
    PremultipliedAlpha,
    /// Additive blending (glows, light cones).
    Additive,
    /// Multiplicative blending (shadow decals).
    Multiply,
}

/// Coarse object category, used as a deterministic depth bias so coincident
/// depths still composite in a fixed category order (ground below agents,
/// agents below effects).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectKind {
    #[default]
    Terrain = 0,
    Road = 1,
    Building = 2,
    Prop = 3,
    Vehicle = 4,
    Agent = 5,
    Effect = 6,
    Overlay = 7,
}

impl ObjectKind {
    /// Depth bias separating coincident-depth categories: `kind / 8 * 0.125`.
    #[inline]
    pub fn depth_bias(self) -> f32 {
        (self as u8 as f32 / 8.0) * 0.125
    }
}

/// One tile/sprite the world system wants drawn this frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderableDescriptor {
    /// World-space position (isometric world axes; z is height).
    pub position: Vec3,
    /// Half-size of the axis-aligned bounds around `position`.
    pub half_extents: Vec3,
    /// Texture atlas page for this sprite.
    pub texture: TextureId,
    /// Blend mode required by the sprite.
    pub blend: BlendMode,
    /// Compositing layer; ties broken by layer before submission order.
    pub layer: u16,
    /// Category for the deterministic depth bias.
    pub kind: ObjectKind,
    /// Rotation in radians, honored when [`DescriptorFlags::ROTATED`] is set.
    pub rotation: f32,
    /// Atlas UV rectangle, supplied by the (external) atlas system.
    pub uv_min: Vec2,
    /// See `uv_min`.
    pub uv_max: Vec2,
    /// Packed RGBA8 tint.
    pub color: u32,
    /// GPU instances this descriptor expands to (grid-repeated tiles).
    pub instance_count: u32,
    /// Draw flags.
    pub flags: DescriptorFlags,
}

impl Default for RenderableDescriptor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            half_extents: Vec3::splat(0.5),
            texture: TextureId(0),
            blend: BlendMode::default(),
            layer: 0,
            kind: ObjectKind::default(),
            rotation: 0.0,
            uv_min: Vec2::ZERO,
            uv_max: Vec2::ONE,
            color: 0xFFFF_FFFF,
            instance_count: 1,
            flags: DescriptorFlags::empty(),
        }
    }
}

impl RenderableDescriptor {
    /// Minimum corner of the world-space bounds.
    #[inline]
    pub fn aabb_min(&self) -> Vec3 {
        self.position - self.half_extents
    }

    /// Maximum corner of the world-space bounds.
    #[inline]
    pub fn aabb_max(&self) -> Vec3 {
        self.position + self.half_extents
    }

    /// Whether the position is usable for culling and sorting.
    #[inline]
    pub fn has_finite_position(&self) -> bool {
        self.position.is_finite() && self.half_extents.is_finite()
    }
}
