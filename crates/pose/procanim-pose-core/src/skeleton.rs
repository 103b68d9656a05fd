//! Skeleton hierarchy and model-space helpers.
//!
//! Bones are stored parent-first: every bone's parent index is lower than its
//! own, so a single forward pass turns a local pose into model space.

use hashbrown::HashMap;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::transform::Transform;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<u16>,
}

/// Serialized skeleton definition as handed over by the asset layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkeletonDef {
    pub name: String,
    pub bones: Vec<Bone>,
    #[serde(rename = "restPose")]
    pub rest_pose: Vec<Transform>,
    #[serde(default, rename = "leftEye")]
    pub left_eye: Option<String>,
    #[serde(default, rename = "rightEye")]
    pub right_eye: Option<String>,
}

/// Validated, immutable skeleton shared between actors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "SkeletonDef", into = "SkeletonDef")]
pub struct Skeleton {
    name: String,
    bones: Vec<Bone>,
    rest_pose: Vec<Transform>,
    lookup: HashMap<String, usize>,
    left_eye: Option<usize>,
    right_eye: Option<usize>,
}

impl Skeleton {
    pub fn new(def: SkeletonDef) -> Result<Self, PoseError> {
        Self::try_from(def)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn rest_pose(&self) -> &[Transform] {
        &self.rest_pose
    }

    /// Index of the bone called `name`, if any.
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    #[inline]
    pub fn parent(&self, bone: usize) -> Option<usize> {
        self.bones.get(bone).and_then(|b| b.parent).map(usize::from)
    }

    pub fn eye_bones(&self) -> (Option<usize>, Option<usize>) {
        (self.left_eye, self.right_eye)
    }

    fn check_pose(&self, local: &[Transform]) -> Result<(), PoseError> {
        if local.len() != self.bones.len() {
            return Err(PoseError::BoneCountMismatch {
                expected: self.bones.len(),
                actual: local.len(),
            });
        }
        Ok(())
    }

    /// Convert a local-space pose to model-space matrices.
    pub fn model_space(
        &self,
        local: &[Transform],
        out: &mut Vec<Matrix4<f32>>,
    ) -> Result<(), PoseError> {
        self.check_pose(local)?;
        out.clear();
        out.reserve(local.len());
        for (idx, t) in local.iter().enumerate() {
            let m = match self.parent(idx) {
                Some(p) => out[p] * t.to_matrix(),
                None => t.to_matrix(),
            };
            out.push(m);
        }
        Ok(())
    }

    /// Model-space matrix of a single bone, walking only its ancestor chain.
    pub fn model_transform(
        &self,
        local: &[Transform],
        bone: usize,
    ) -> Result<Matrix4<f32>, PoseError> {
        self.check_pose(local)?;
        if bone >= local.len() {
            return Err(PoseError::InvalidSkeleton(format!(
                "bone index {bone} out of range"
            )));
        }
        let mut m = local[bone].to_matrix();
        let mut cursor = self.parent(bone);
        while let Some(p) = cursor {
            m = local[p].to_matrix() * m;
            cursor = self.parent(p);
        }
        Ok(m)
    }
}

impl TryFrom<SkeletonDef> for Skeleton {
    type Error = PoseError;

    fn try_from(def: SkeletonDef) -> Result<Self, Self::Error> {
        if def.bones.is_empty() {
            return Err(PoseError::InvalidSkeleton(format!(
                "skeleton '{}' has no bones",
                def.name
            )));
        }
        if def.bones.len() > usize::from(u16::MAX) {
            return Err(PoseError::InvalidSkeleton(format!(
                "skeleton '{}' has too many bones",
                def.name
            )));
        }
        if def.rest_pose.len() != def.bones.len() {
            return Err(PoseError::BoneCountMismatch {
                expected: def.bones.len(),
                actual: def.rest_pose.len(),
            });
        }
        let mut lookup: HashMap<String, usize> = HashMap::with_capacity(def.bones.len());
        for (idx, bone) in def.bones.iter().enumerate() {
            if let Some(p) = bone.parent {
                if usize::from(p) >= idx {
                    return Err(PoseError::InvalidSkeleton(format!(
                        "bone '{}' must come after its parent",
                        bone.name
                    )));
                }
            }
            if lookup.insert(bone.name.clone(), idx).is_some() {
                return Err(PoseError::InvalidSkeleton(format!(
                    "duplicate bone name '{}'",
                    bone.name
                )));
            }
        }
        if let Some(bad) = def.rest_pose.iter().position(|t| !t.is_finite()) {
            return Err(PoseError::InvalidSkeleton(format!(
                "rest pose of bone {bad} is not finite"
            )));
        }
        let resolve_eye = |name: &Option<String>| -> Result<Option<usize>, PoseError> {
            match name {
                None => Ok(None),
                Some(n) => lookup
                    .get(n)
                    .map(|idx| Some(*idx))
                    .ok_or_else(|| PoseError::InvalidSkeleton(format!("unknown eye bone '{n}'"))),
            }
        };
        let left_eye = resolve_eye(&def.left_eye)?;
        let right_eye = resolve_eye(&def.right_eye)?;
        Ok(Skeleton {
            name: def.name,
            bones: def.bones,
            rest_pose: def.rest_pose,
            lookup,
            left_eye,
            right_eye,
        })
    }
}

impl From<Skeleton> for SkeletonDef {
    fn from(s: Skeleton) -> Self {
        let eye_name = |idx: Option<usize>| idx.map(|i| s.bones[i].name.clone());
        SkeletonDef {
            left_eye: eye_name(s.left_eye),
            right_eye: eye_name(s.right_eye),
            name: s.name,
            bones: s.bones,
            rest_pose: s.rest_pose,
        }
    }
}
