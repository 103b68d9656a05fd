//! Blending utilities for transforms, poses and morph weights.
//! - translation/scale: linear interpolation
//! - rotation: shortest-arc slerp, nlerp when slerp is ill-defined
//! - morph weights: elementwise lerp, missing entries read as 0.0

use nalgebra::UnitQuaternion;

use crate::error::PoseError;
use crate::transform::Transform;

#[inline]
fn slerp_shortest(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let b = if a.coords.dot(&b.coords) < 0.0 {
        UnitQuaternion::new_unchecked(-b.into_inner())
    } else {
        *b
    };
    a.try_slerp(&b, t, 1.0e-6).unwrap_or_else(|| a.nlerp(&b, t))
}

/// Blend two transforms; `t = 0` yields `a`, `t = 1` yields `b`.
pub fn blend_transforms(a: &Transform, b: &Transform, t: f32) -> Transform {
    let t = t.clamp(0.0, 1.0);
    Transform {
        translation: a.translation.lerp(&b.translation, t),
        rotation: slerp_shortest(&a.rotation, &b.rotation, t),
        scale: a.scale.lerp(&b.scale, t),
    }
}

/// Blend two poses bone by bone into `out`.
pub fn blend_poses(
    a: &[Transform],
    b: &[Transform],
    t: f32,
    out: &mut [Transform],
) -> Result<(), PoseError> {
    if a.len() != out.len() {
        return Err(PoseError::BoneCountMismatch {
            expected: out.len(),
            actual: a.len(),
        });
    }
    if b.len() != out.len() {
        return Err(PoseError::BoneCountMismatch {
            expected: out.len(),
            actual: b.len(),
        });
    }
    for ((dst, lhs), rhs) in out.iter_mut().zip(a).zip(b) {
        *dst = blend_transforms(lhs, rhs, t);
    }
    Ok(())
}

/// Blend two morph-weight sets into `out`, sized to the longer input.
pub fn blend_weights(a: &[f32], b: &[f32], t: f32, out: &mut Vec<f32>) {
    let t = t.clamp(0.0, 1.0);
    let len = a.len().max(b.len());
    out.clear();
    out.extend((0..len).map(|i| {
        let lhs = a.get(i).copied().unwrap_or(0.0);
        let rhs = b.get(i).copied().unwrap_or(0.0);
        lhs + (rhs - lhs) * t
    }));
}
