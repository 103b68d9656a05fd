//! Local-space bone transform (translation, rotation, scale).

use nalgebra::{Matrix4, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Translation/rotation/scale triple for a single bone.
///
/// Serialized in the same flat shape used by stored animation data:
/// `{ "pos": [x, y, z], "rot": [x, y, z, w], "scale": [x, y, z] }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransformRepr", into = "TransformRepr")]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn new(
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    pub fn from_rotation(rotation: UnitQuaternion<f32>) -> Self {
        Self {
            rotation,
            ..Self::identity()
        }
    }

    /// Homogeneous matrix applying scale, then rotation, then translation.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|c| c.is_finite())
            && self.rotation.coords.iter().all(|c| c.is_finite())
            && self.scale.iter().all(|c| c.is_finite())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct TransformRepr {
    #[serde(default)]
    pos: [f32; 3],
    #[serde(default = "identity_rot")]
    rot: [f32; 4],
    #[serde(default = "unit_scale")]
    scale: [f32; 3],
}

fn identity_rot() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl From<TransformRepr> for Transform {
    fn from(r: TransformRepr) -> Self {
        let [x, y, z, w] = r.rot;
        Transform {
            translation: Vector3::from(r.pos),
            rotation: UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(w, x, y, z)),
            scale: Vector3::from(r.scale),
        }
    }
}

impl From<Transform> for TransformRepr {
    fn from(t: Transform) -> Self {
        let q = t.rotation.quaternion();
        TransformRepr {
            pos: [t.translation.x, t.translation.y, t.translation.z],
            rot: [q.i, q.j, q.k, q.w],
            scale: [t.scale.x, t.scale.y, t.scale.z],
        }
    }
}
