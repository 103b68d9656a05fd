//! Sampled animation clips.
//!
//! Model:
//! - A [`RawAnimationClip`] is what the asset layer hands over: per-bone key
//!   tracks addressed by bone name, times in seconds within `[0, duration]`.
//! - [`AnimationClip::build`] validates the raw data against one skeleton and
//!   resolves bone names to indices. The result is immutable and shared.
//! - Between two keys translation/scale are lerped and rotation slerped.
//!   Bones without a track keep the rest pose.
//! - Optional [`FaceTracks`] carry one scalar track per morph target.

use serde::{Deserialize, Serialize};

use crate::blend::blend_transforms;
use crate::error::PoseError;
use crate::skeleton::Skeleton;
use crate::transform::Transform;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformKey {
    pub time: f32,
    pub value: Transform,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarKey {
    pub time: f32,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawBoneTrack {
    pub bone: String,
    pub keys: Vec<TransformKey>,
}

/// Morph-target tracks with their own duration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceTracks {
    pub duration: f32,
    pub tracks: Vec<Vec<ScalarKey>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawAnimationClip {
    pub name: String,
    /// Duration in seconds.
    pub duration: f32,
    pub tracks: Vec<RawBoneTrack>,
    #[serde(default)]
    pub face: Option<FaceTracks>,
}

#[derive(Clone, Debug, PartialEq)]
struct BoneTrack {
    bone: usize,
    keys: Vec<TransformKey>,
}

/// Runtime clip bound to one skeleton's bone order.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    name: String,
    duration: f32,
    bone_count: usize,
    tracks: Vec<BoneTrack>,
    face: Option<FaceTracks>,
}

fn validate_times(
    label: &str,
    times: impl Iterator<Item = f32>,
    duration: f32,
) -> Result<(), PoseError> {
    let mut last = f32::NEG_INFINITY;
    for t in times {
        if !t.is_finite() || t < 0.0 || t > duration {
            return Err(PoseError::InvalidClip(format!(
                "key time {t} outside [0, {duration}] in '{label}'"
            )));
        }
        if t < last {
            return Err(PoseError::InvalidClip(format!(
                "key times must be non-decreasing in '{label}'"
            )));
        }
        last = t;
    }
    Ok(())
}

/// Locate the key pair bracketing `time` and the local blend factor.
/// Returns `(i, i, 0.0)` when `time` is before the first or after the last key.
fn find_segment<K>(keys: &[K], time: f32, key_time: impl Fn(&K) -> f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n <= 1 || time <= key_time(&keys[0]) {
        return (0, 0, 0.0);
    }
    if time >= key_time(&keys[n - 1]) {
        return (n - 1, n - 1, 0.0);
    }
    let upper = keys.partition_point(|k| key_time(k) <= time).min(n - 1);
    let lower = upper - 1;
    let (t0, t1) = (key_time(&keys[lower]), key_time(&keys[upper]));
    let denom = (t1 - t0).max(f32::EPSILON);
    let lt = ((time - t0) / denom).clamp(0.0, 1.0);
    (lower, upper, lt)
}

fn sample_transform_keys(keys: &[TransformKey], time: f32) -> Option<Transform> {
    match keys.len() {
        0 => None,
        1 => Some(keys[0].value),
        _ => {
            let (i0, i1, lt) = find_segment(keys, time, |k| k.time);
            if i0 == i1 {
                Some(keys[i0].value)
            } else {
                Some(blend_transforms(&keys[i0].value, &keys[i1].value, lt))
            }
        }
    }
}

fn sample_scalar_keys(keys: &[ScalarKey], time: f32) -> f32 {
    match keys.len() {
        0 => 0.0,
        1 => keys[0].value,
        _ => {
            let (i0, i1, lt) = find_segment(keys, time, |k| k.time);
            let a = keys[i0].value;
            let b = keys[i1].value;
            a + (b - a) * lt
        }
    }
}

impl AnimationClip {
    /// Validate `raw` and bind it to `skeleton`.
    pub fn build(raw: RawAnimationClip, skeleton: &Skeleton) -> Result<Self, PoseError> {
        if !raw.duration.is_finite() || raw.duration <= 0.0 {
            return Err(PoseError::InvalidClip(format!(
                "clip '{}' duration must be > 0",
                raw.name
            )));
        }
        let mut tracks = Vec::with_capacity(raw.tracks.len());
        for track in raw.tracks {
            let bone = skeleton.bone_index(&track.bone).ok_or_else(|| {
                PoseError::InvalidClip(format!(
                    "clip '{}' animates unknown bone '{}'",
                    raw.name, track.bone
                ))
            })?;
            validate_times(&track.bone, track.keys.iter().map(|k| k.time), raw.duration)?;
            if track.keys.iter().any(|k| !k.value.is_finite()) {
                return Err(PoseError::InvalidClip(format!(
                    "non-finite key on bone '{}'",
                    track.bone
                )));
            }
            tracks.push(BoneTrack {
                bone,
                keys: track.keys,
            });
        }
        if let Some(face) = &raw.face {
            if !face.duration.is_finite() || face.duration < 0.0 {
                return Err(PoseError::InvalidClip(format!(
                    "clip '{}' face duration must be >= 0",
                    raw.name
                )));
            }
            for (idx, keys) in face.tracks.iter().enumerate() {
                validate_times(
                    &format!("morph {idx}"),
                    keys.iter().map(|k| k.time),
                    face.duration,
                )?;
            }
        }
        Ok(AnimationClip {
            name: raw.name,
            duration: raw.duration,
            bone_count: skeleton.bone_count(),
            tracks,
            face: raw.face,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bone_count
    }

    pub fn has_face(&self) -> bool {
        self.face.is_some()
    }

    /// Sample the clip at `time` seconds, starting from `rest` for untracked bones.
    pub fn sample(
        &self,
        time: f32,
        rest: &[Transform],
        out: &mut [Transform],
    ) -> Result<(), PoseError> {
        for len in [rest.len(), out.len()] {
            if len != self.bone_count {
                return Err(PoseError::BoneCountMismatch {
                    expected: self.bone_count,
                    actual: len,
                });
            }
        }
        let time = time.clamp(0.0, self.duration);
        out.copy_from_slice(rest);
        for track in &self.tracks {
            if let Some(t) = sample_transform_keys(&track.keys, time) {
                out[track.bone] = t;
            }
        }
        Ok(())
    }

    /// Sample morph weights at `time` seconds. Clears `out` when the clip has no face data.
    pub fn sample_face(&self, time: f32, out: &mut Vec<f32>) {
        out.clear();
        if let Some(face) = &self.face {
            let time = time.clamp(0.0, face.duration);
            out.extend(face.tracks.iter().map(|keys| sample_scalar_keys(keys, time)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_lookup_handles_edges() {
        let times = [0.0f32, 0.5, 1.0];
        assert_eq!(find_segment(&times, -1.0, |t| *t), (0, 0, 0.0));
        assert_eq!(find_segment(&times, 2.0, |t| *t), (2, 2, 0.0));
        let (a, b, t) = find_segment(&times, 0.75, |t| *t);
        assert_eq!((a, b), (1, 2));
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn segment_lookup_on_exact_key() {
        let times = [0.0f32, 0.5, 1.0];
        let (a, b, t) = find_segment(&times, 0.5, |t| *t);
        assert_eq!((a, b), (1, 2));
        assert_eq!(t, 0.0);
    }
}
