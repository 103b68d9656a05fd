//! Per-kind evaluation dispatch.

use std::f32::consts::TAU;

use log::debug;
use nalgebra::{Matrix4, Vector3};
use procanim_pose_core::{blend_poses, PoseHandle, PosePool, Skeleton};

use super::node_state::NodeState;
use crate::error::EvalError;
use crate::graph::{AnimBinding, BoundNode, NodeConfig};
use crate::schema::NodeKind;
use crate::spring::{PhysicsConfig, SpringPhysicsJob};
use crate::types::EvalResult;

/// Per-tick environment shared by every node evaluation.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub pool: &'a PosePool,
    /// World-space transform of the actor root.
    pub root_transform: Matrix4<f32>,
    pub physics: PhysicsConfig,
}

impl<'a> EvalEnv<'a> {
    pub fn new(pool: &'a PosePool) -> Self {
        EvalEnv {
            pool,
            root_transform: Matrix4::identity(),
            physics: PhysicsConfig::default(),
        }
    }
}

fn input<'r>(
    node: &BoundNode,
    inputs: &[Option<&'r EvalResult>],
    idx: usize,
) -> Result<Option<&'r EvalResult>, EvalError> {
    let port = &node.signature().inputs[idx];
    match inputs.get(idx).copied().flatten() {
        Some(value) if value.eval_type() != port.ty => Err(EvalError::InputTypeMismatch {
            node: node.sync_id,
            input: port.name,
            expected: port.ty,
            actual: value.eval_type(),
        }),
        Some(value) => Ok(Some(value)),
        None if port.optional => Ok(None),
        None => Err(EvalError::MissingInput {
            node: node.sync_id,
            input: port.name,
        }),
    }
}

fn float_input(
    node: &BoundNode,
    inputs: &[Option<&EvalResult>],
    idx: usize,
    default: f32,
) -> Result<f32, EvalError> {
    Ok(input(node, inputs, idx)?
        .and_then(EvalResult::as_float)
        .unwrap_or(default))
}

fn pose_input<'r>(
    node: &BoundNode,
    inputs: &[Option<&'r EvalResult>],
    idx: usize,
) -> Result<&'r PoseHandle, EvalError> {
    input(node, inputs, idx)?
        .and_then(EvalResult::as_pose)
        .ok_or(EvalError::MissingInput {
            node: node.sync_id,
            input: node.signature().inputs[idx].name,
        })
}

/// Evaluate one node given its already-resolved inputs (in signature order).
pub(crate) fn eval_node(
    node: &BoundNode,
    inputs: &[Option<&EvalResult>],
    state: &mut NodeState,
    skeleton: &Skeleton,
    env: &EvalEnv<'_>,
) -> Result<EvalResult, EvalError> {
    match node.kind {
        NodeKind::Constant => match node.config {
            NodeConfig::Constant(v) => Ok(EvalResult::Float(v)),
            _ => Ok(EvalResult::Float(0.0)),
        },
        NodeKind::IdConstant => match node.config {
            NodeConfig::IdConstant(v) => Ok(EvalResult::Id(v)),
            _ => Ok(EvalResult::Id(0)),
        },
        NodeKind::Add => {
            let a = float_input(node, inputs, 0, 0.0)?;
            let b = float_input(node, inputs, 1, 0.0)?;
            Ok(EvalResult::Float(a + b))
        }
        NodeKind::Multiply => {
            let a = float_input(node, inputs, 0, 0.0)?;
            let b = float_input(node, inputs, 1, 0.0)?;
            Ok(EvalResult::Float(a * b))
        }
        NodeKind::Oscillator => eval_oscillator(node, inputs, state),
        NodeKind::RestPose => Ok(EvalResult::Pose(env.pool.acquire_copy(skeleton.rest_pose())?)),
        NodeKind::Anim => eval_anim(node, inputs, state, skeleton, env),
        NodeKind::Blend => {
            let a = pose_input(node, inputs, 0)?;
            let b = pose_input(node, inputs, 1)?;
            let weight = float_input(node, inputs, 2, 0.0)?;
            let weight = if weight.is_finite() {
                weight.clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut out = env.pool.acquire(a.bone_count())?;
            blend_poses(a.pose(), b.pose(), weight, out.pose_mut())?;
            Ok(EvalResult::Pose(out))
        }
        NodeKind::SpringBone => eval_spring_bone(node, inputs, state, skeleton, env),
    }
}

fn eval_oscillator(
    node: &BoundNode,
    inputs: &[Option<&EvalResult>],
    state: &mut NodeState,
) -> Result<EvalResult, EvalError> {
    let frequency = float_input(node, inputs, 0, 0.0)?;
    let amplitude = float_input(node, inputs, 1, 1.0)?;
    let clock = state.clock_mut();
    clock.period = (frequency.is_finite() && frequency > 0.0).then(|| 1.0 / frequency);
    clock.wrap();
    Ok(EvalResult::Float(
        amplitude * (TAU * frequency * clock.time).sin(),
    ))
}

fn eval_anim(
    node: &BoundNode,
    inputs: &[Option<&EvalResult>],
    state: &mut NodeState,
    skeleton: &Skeleton,
    env: &EvalEnv<'_>,
) -> Result<EvalResult, EvalError> {
    let speed = float_input(node, inputs, 0, 1.0)?;
    let clock = state.clock_mut();
    clock.rate = if speed.is_finite() { speed } else { 1.0 };
    let mut out = env.pool.acquire(skeleton.bone_count())?;
    match &node.config {
        NodeConfig::Anim(AnimBinding::Ready(clip)) => {
            clock.period = Some(clip.duration());
            clock.wrap();
            clip.sample(clock.time, skeleton.rest_pose(), out.pose_mut())?;
        }
        _ => out.copy_from(skeleton.rest_pose())?,
    }
    Ok(EvalResult::Pose(out))
}

fn eval_spring_bone(
    node: &BoundNode,
    inputs: &[Option<&EvalResult>],
    state: &mut NodeState,
    skeleton: &Skeleton,
    env: &EvalEnv<'_>,
) -> Result<EvalResult, EvalError> {
    let pose = pose_input(node, inputs, 0)?;
    let stiffness = float_input(node, inputs, 1, 0.0)?;
    let damping = float_input(node, inputs, 2, 0.0)?;
    let mass = float_input(node, inputs, 3, 0.0)?;
    let gravity = Vector3::new(
        float_input(node, inputs, 4, 0.0)?,
        float_input(node, inputs, 5, 0.0)?,
        float_input(node, inputs, 6, 0.0)?,
    );
    let mut out = env.pool.acquire_copy(pose.pose())?;
    let NodeConfig::SpringBone { bone, parent } = node.config else {
        return Ok(EvalResult::Pose(out));
    };

    let bone_transform = skeleton.model_transform(pose.pose(), bone)?;
    let parent_transform = match parent {
        Some(p) => skeleton.model_transform(pose.pose(), p)?,
        None => Matrix4::identity(),
    };
    let mut offset = out.pose()[bone].translation;
    let ok = SpringPhysicsJob {
        stiffness,
        damping,
        mass,
        gravity,
        bone_transform: &bone_transform,
        parent_transform: &parent_transform,
        root_transform: &env.root_transform,
        config: env.physics,
        context: state.spring_mut(),
        position_output: &mut offset,
    }
    .run();
    if ok {
        out.pose_mut()[bone].translation = offset;
    } else {
        debug!("node {}: spring step skipped on degenerate input", node.sync_id);
    }
    Ok(EvalResult::Pose(out))
}

