use procanim_graph_core::{BindError, EvalError, EvalType};
use procanim_pose_core::{FileId, PoseError};
use thiserror::Error;

use crate::ids::ActorId;

/// Errors surfaced by the animation core. All are recoverable: the worst
/// outcome of any of them is an actor keeping its last pose for a tick.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AnimError {
    #[error("invalid actor {0}")]
    InvalidActor(ActorId),

    #[error("{0} has no animation graph")]
    GraphNotFound(ActorId),

    #[error("{0} has no active sequencer")]
    NoSequencer(ActorId),

    #[error("synchronization needs at least two actors, got {count}")]
    NotEnoughActors { count: usize },

    #[error("skeleton '{0}' not found")]
    SkeletonNotFound(String),

    #[error("clip {0} not found")]
    ClipNotFound(FileId),

    #[error("node graph produces {0}, a pose is required")]
    NotAPoseGraph(EvalType),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Pose(#[from] PoseError),
}
