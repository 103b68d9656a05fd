//! procanim pose core (engine-agnostic)
//!
//! Shared primitives for the procanim runtime: local-space bone [`Transform`]s,
//! pose blending, [`Skeleton`] hierarchies, sampled [`AnimationClip`]s and the
//! [`PosePool`] that hands out reusable pose buffers during evaluation.
//!
//! Asset loading lives outside this crate. Hosts implement [`AnimationSource`]
//! and hand already-validated data to the runtime.

pub mod assets;
pub mod blend;
pub mod clip;
pub mod error;
pub mod pool;
pub mod skeleton;
pub mod transform;

pub use assets::{AnimationSource, ClipRequest, FileId};
pub use blend::{blend_poses, blend_transforms, blend_weights};
pub use clip::{AnimationClip, FaceTracks, RawAnimationClip, RawBoneTrack, ScalarKey, TransformKey};
pub use error::PoseError;
pub use pool::{PoolStats, PoseHandle, PosePool};
pub use skeleton::{Bone, Skeleton, SkeletonDef};
pub use transform::Transform;

pub use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
