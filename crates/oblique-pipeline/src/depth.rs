//! Isometric depth keys.
//!
//! The painter's-order scalar for a world position is
//! `x + y + z * height_factor` plus a small per-category bias, so two
//! objects on the same ground cell still composite in a fixed category
//! order. Keys are carried as order-preserving `u32` bit patterns so the
//! radix sorter can treat them as plain unsigned integers.

use glam::{Vec3, Vec4};

use crate::descriptor::{ObjectKind, RenderableDescriptor};

/// Sortable proxy for one visible descriptor.
///
/// `index` is the descriptor's position in the candidate array, which is
/// also its submission order; the sorter uses it as the final tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthEntry {
    /// Descriptor index (submission order).
    pub index: u32,
    /// Order-preserving depth bits; see [`ordered_depth_key`].
    pub key: u32,
    /// Compositing layer, first tie-break for equal depth.
    pub layer: u16,
}

/// Scalar isometric depth for a world position.
#[inline]
pub fn isometric_depth(position: Vec3, kind: ObjectKind, height_factor: f32) -> f32 {
    position.x + position.y + position.z * height_factor + kind.depth_bias()
}

/// Map an `f32` depth to a `u32` that sorts identically as an unsigned int.
///
/// IEEE-754 bit patterns do not radix-sort correctly once negative values
/// appear: negative floats compare inverted and sort above positives. The
/// standard fix is applied here: flip all bits of negative values and only
/// the sign bit of non-negative ones.
#[inline]
pub fn ordered_depth_key(depth: f32) -> u32 {
    let bits = depth.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Compute depth entries for the visible subset, in submission order.
///
/// Depths are evaluated four at a time with a scalar tail; the camera
/// snapshot never changes mid-frame so the whole pass is branch-free per
/// lane apart from the key transform.
pub fn build_entries(
    descriptors: &[RenderableDescriptor],
    visible: &[u32],
    height_factor: f32,
    out: &mut Vec<DepthEntry>,
) {
    out.clear();
    out.reserve(visible.len());

    let hf = Vec4::splat(height_factor);
    let chunks = visible.len() / 4;

    for c in 0..chunks {
        let idx = &visible[c * 4..c * 4 + 4];
        let d = [
            &descriptors[idx[0] as usize],
            &descriptors[idx[1] as usize],
            &descriptors[idx[2] as usize],
            &descriptors[idx[3] as usize],
        ];

        let xs = Vec4::new(d[0].position.x, d[1].position.x, d[2].position.x, d[3].position.x);
        let ys = Vec4::new(d[0].position.y, d[1].position.y, d[2].position.y, d[3].position.y);
        let zs = Vec4::new(d[0].position.z, d[1].position.z, d[2].position.z, d[3].position.z);
        let bias = Vec4::new(
            d[0].kind.depth_bias(),
            d[1].kind.depth_bias(),
            d[2].kind.depth_bias(),
            d[3].kind.depth_bias(),
        );

        let depth = xs + ys + zs * hf + bias;

        for lane in 0..4 {
            out.push(DepthEntry {
                index: idx[lane],
                key: ordered_depth_key(depth[lane]),
                layer: d[lane].layer,
            });
        }
    }

    for &i in &visible[chunks * 4..] {
        let desc = &descriptors[i as usize];
        let depth = isometric_depth(desc.position, desc.kind, height_factor);
        out.push(DepthEntry {
            index: i,
            key: ordered_depth_key(depth),
            layer: desc.layer,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_transform_preserves_order() {
        let depths = [
            f32::MIN,
            -1000.5,
            -1.0,
            -f32::MIN_POSITIVE,
            0.0,
            f32::MIN_POSITIVE,
            0.25,
            1.0,
            1000.5,
            f32::MAX,
        ];
        for pair in depths.windows(2) {
            assert!(
                ordered_depth_key(pair[0]) < ordered_depth_key(pair[1]),
                "{} should key below {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_negative_zero_keys_like_zero_neighbourhood() {
        // -0.0 and 0.0 may key differently but must stay between the
        // smallest negative and smallest positive values.
        let neg = ordered_depth_key(-f32::MIN_POSITIVE);
        let pos = ordered_depth_key(f32::MIN_POSITIVE);
        let nz = ordered_depth_key(-0.0);
        let pz = ordered_depth_key(0.0);
        assert!(neg < nz && nz <= pz && pz < pos);
    }

    #[test]
    fn test_height_factor_weighting() {
        let flat = isometric_depth(Vec3::new(2.0, 3.0, 0.0), ObjectKind::Terrain, 1.5);
        let tall = isometric_depth(Vec3::new(2.0, 3.0, 4.0), ObjectKind::Terrain, 1.5);
        assert_eq!(flat, 5.0);
        assert_eq!(tall, 11.0);
    }

    #[test]
    fn test_vector_and_scalar_paths_agree() {
        let descriptors: Vec<RenderableDescriptor> = (0..11)
            .map(|i| RenderableDescriptor {
                position: Vec3::new(i as f32 * 1.7 - 9.0, i as f32, -(i as f32) * 0.3),
                layer: (i % 3) as u16,
                kind: if i % 2 == 0 { ObjectKind::Terrain } else { ObjectKind::Agent },
                ..Default::default()
            })
            .collect();
        let visible: Vec<u32> = (0..descriptors.len() as u32).collect();

        let mut out = Vec::new();
        build_entries(&descriptors, &visible, 1.5, &mut out);

        assert_eq!(out.len(), descriptors.len());
        for (i, entry) in out.iter().enumerate() {
            let d = &descriptors[i];
            let expected = ordered_depth_key(isometric_depth(d.position, d.kind, 1.5));
            assert_eq!(entry.key, expected, "entry {i}");
            assert_eq!(entry.index, i as u32);
            assert_eq!(entry.layer, d.layer);
        }
    }
}
