use procanim_pose_core::PoseError;
use thiserror::Error;

use crate::types::{EvalType, SyncId};

/// Failure while turning a [`GraphSpec`](crate::GraphSpec) into a bound [`PGraph`](crate::PGraph).
/// Any of these aborts construction; no partially wired graph is returned.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum BindError {
    #[error("node {node}: unknown node type '{type_name}'")]
    UnknownNodeType { node: SyncId, type_name: String },

    #[error("sync id {0} is used by more than one node")]
    DuplicateSyncId(SyncId),

    #[error("output node {0} does not exist")]
    MissingOutput(SyncId),

    #[error("node {node}: no input named '{input}'")]
    UnknownInput { node: SyncId, input: String },

    #[error("node {node}: required input '{input}' is not connected")]
    MissingInput { node: SyncId, input: String },

    #[error("node {node}: input '{input}' expects {expected}, source produces {actual}")]
    InputTypeMismatch {
        node: SyncId,
        input: String,
        expected: EvalType,
        actual: EvalType,
    },

    #[error("node {node}: input '{input}' references missing node {source_id}")]
    DanglingInput {
        node: SyncId,
        input: String,
        source_id: SyncId,
    },

    #[error("node {node}: custom value '{name}' expects {expected}, got {actual}")]
    BindingTypeMismatch {
        node: SyncId,
        name: String,
        expected: EvalType,
        actual: EvalType,
    },

    #[error("node {node}: custom value '{name}' = '{value}' does not resolve")]
    UnresolvedCustomValue {
        node: SyncId,
        name: String,
        value: String,
    },

    #[error("node {node}: missing custom value '{name}'")]
    MissingCustomValue { node: SyncId, name: String },
}

/// Failure while evaluating a bound graph for one tick.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EvalError {
    #[error("cycle detected in graph at node {sync_id}")]
    CycleDetected { sync_id: SyncId },

    #[error("node {sync_id} does not exist")]
    UnknownNode { sync_id: SyncId },

    #[error("node {node}: input '{input}' produced no value")]
    MissingInput { node: SyncId, input: &'static str },

    #[error("node {node}: input '{input}' expected {expected}, got {actual}")]
    InputTypeMismatch {
        node: SyncId,
        input: &'static str,
        expected: EvalType,
        actual: EvalType,
    },

    #[error(transparent)]
    Pose(#[from] PoseError),
}
