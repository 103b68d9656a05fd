//! Error type shared by pose, skeleton and clip helpers.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PoseError {
    /// Every buffer is checked out and the pool may not grow.
    #[error("pose pool exhausted ({capacity} buffers in use)")]
    PoolExhausted { capacity: usize },

    #[error("pose has {actual} bones, skeleton expects {expected}")]
    BoneCountMismatch { expected: usize, actual: usize },

    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    #[error("invalid clip: {0}")]
    InvalidClip(String),
}
