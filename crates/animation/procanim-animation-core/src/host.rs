//! Contracts with the host process.

use nalgebra::Matrix4;
use procanim_pose_core::Transform;

use crate::ids::ActorId;

/// Resolves actor identity to skeleton and placement.
pub trait ActorResolver: Send + Sync {
    /// Name of the skeleton bound to `actor`, or `None` if the actor is unknown.
    fn skeleton_name(&self, actor: ActorId) -> Option<String>;

    /// Current world-space root transform of `actor`.
    fn root_transform(&self, actor: ActorId) -> Option<Matrix4<f32>>;
}

/// Receives computed poses from [`GraphManager::update_all`](crate::GraphManager::update_all).
pub trait PoseConsumer {
    fn consume(&mut self, actor: ActorId, pose: &[Transform], face_morphs: &[f32]);
}

impl<F> PoseConsumer for F
where
    F: FnMut(ActorId, &[Transform], &[f32]),
{
    fn consume(&mut self, actor: ActorId, pose: &[Transform], face_morphs: &[f32]) {
        self(actor, pose, face_morphs)
    }
}
