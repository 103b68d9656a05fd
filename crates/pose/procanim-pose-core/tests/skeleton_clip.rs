use approx::assert_relative_eq;
use procanim_pose_core::{
    AnimationClip, PoseError, RawAnimationClip, Skeleton, Transform, UnitQuaternion, Vector3,
};

fn chain_skeleton() -> Skeleton {
    serde_json::from_value(serde_json::json!({
        "name": "chain",
        "bones": [
            { "name": "root" },
            { "name": "spine", "parent": 0 },
            { "name": "head", "parent": 1 },
            { "name": "eye_l", "parent": 2 }
        ],
        "restPose": [
            { "pos": [0, 0, 0] },
            { "pos": [0, 0, 1] },
            { "pos": [0, 0, 1] },
            { "pos": [0.1, 0, 0.1] }
        ],
        "leftEye": "eye_l"
    }))
    .expect("skeleton json")
}

fn raw_clip(duration: f32) -> RawAnimationClip {
    serde_json::from_value(serde_json::json!({
        "name": "nod",
        "duration": duration,
        "tracks": [{
            "bone": "head",
            "keys": [
                { "time": 0.0, "value": { "pos": [0, 0, 1] } },
                { "time": 1.0, "value": { "pos": [0, 2, 1] } }
            ]
        }],
        "face": { "duration": 0.5, "tracks": [[
            { "time": 0.0, "value": 0.0 },
            { "time": 0.5, "value": 1.0 }
        ]] }
    }))
    .expect("clip json")
}

#[test]
fn skeleton_resolves_names_and_eyes() {
    let skel = chain_skeleton();
    assert_eq!(skel.bone_count(), 4);
    assert_eq!(skel.bone_index("head"), Some(2));
    assert_eq!(skel.parent(2), Some(1));
    assert_eq!(skel.eye_bones(), (Some(3), None));
}

#[test]
fn skeleton_rejects_child_before_parent() {
    let err = serde_json::from_value::<Skeleton>(serde_json::json!({
        "name": "bad",
        "bones": [{ "name": "a", "parent": 1 }, { "name": "b" }],
        "restPose": [{}, {}]
    }))
    .unwrap_err();
    assert!(err.to_string().contains("must come after its parent"));
}

#[test]
fn model_space_accumulates_parent_chain() {
    let skel = chain_skeleton();
    let mut ms = Vec::new();
    skel.model_space(skel.rest_pose(), &mut ms).unwrap();
    let head = ms[2].transform_point(&nalgebra::Point3::origin());
    assert_relative_eq!(head.z, 2.0, epsilon = 1e-6);

    let single = skel.model_transform(skel.rest_pose(), 3).unwrap();
    assert_relative_eq!(single, ms[3], epsilon = 1e-6);
}

#[test]
fn model_space_rotates_children() {
    let skel = chain_skeleton();
    let mut pose = skel.rest_pose().to_vec();
    pose[1].rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_2);
    let head = skel.model_transform(&pose, 2).unwrap();
    let p = head.transform_point(&nalgebra::Point3::origin());
    assert_relative_eq!(p.y, -1.0, epsilon = 1e-5);
    assert_relative_eq!(p.z, 1.0, epsilon = 1e-5);
}

#[test]
fn clip_samples_tracked_bone_and_keeps_rest_elsewhere() {
    let skel = chain_skeleton();
    let clip = AnimationClip::build(raw_clip(1.0), &skel).unwrap();
    let mut out = vec![Transform::identity(); 4];
    clip.sample(0.25, skel.rest_pose(), &mut out).unwrap();
    assert_relative_eq!(out[2].translation.y, 0.5, epsilon = 1e-6);
    assert_eq!(out[1], skel.rest_pose()[1]);

    // Past the end clamps to the last key.
    clip.sample(5.0, skel.rest_pose(), &mut out).unwrap();
    assert_relative_eq!(out[2].translation.y, 2.0, epsilon = 1e-6);
}

#[test]
fn clip_samples_face_tracks_on_their_own_duration() {
    let skel = chain_skeleton();
    let clip = AnimationClip::build(raw_clip(1.0), &skel).unwrap();
    let mut morphs = Vec::new();
    clip.sample_face(0.25, &mut morphs);
    assert_eq!(morphs.len(), 1);
    assert_relative_eq!(morphs[0], 0.5, epsilon = 1e-6);
    clip.sample_face(0.9, &mut morphs);
    assert_relative_eq!(morphs[0], 1.0, epsilon = 1e-6);
}

#[test]
fn clip_build_rejects_unknown_bone_and_bad_times() {
    let skel = chain_skeleton();
    let mut raw = raw_clip(1.0);
    raw.tracks[0].bone = "tail".into();
    assert!(matches!(
        AnimationClip::build(raw, &skel),
        Err(PoseError::InvalidClip(msg)) if msg.contains("tail")
    ));

    // Key at t = 1.0 falls outside a 0.5 s clip.
    assert!(AnimationClip::build(raw_clip(0.5), &skel).is_err());
}

#[test]
fn clip_sample_checks_bone_count() {
    let skel = chain_skeleton();
    let clip = AnimationClip::build(raw_clip(1.0), &skel).unwrap();
    let mut out = vec![Transform::identity(); 2];
    assert_eq!(
        clip.sample(0.0, skel.rest_pose(), &mut out),
        Err(PoseError::BoneCountMismatch {
            expected: 4,
            actual: 2
        })
    );
}
