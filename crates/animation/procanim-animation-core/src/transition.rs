//! Time-bounded cross-blend between an outgoing and an incoming generator.

use procanim_pose_core::{blend_poses, blend_weights, Transform};

use crate::error::AnimError;
use crate::generator::{GenerateContext, Generator};
use crate::sync::SyncPoint;

/// Either side may be empty: no outgoing generator fades in from the rest
/// pose, no incoming generator fades out to it.
pub struct Transition {
    from: Option<Box<dyn Generator>>,
    to: Option<Box<dyn Generator>>,
    duration: f32,
    elapsed: f32,
    morphs: Vec<f32>,
}

impl Transition {
    pub fn new(
        from: Option<Box<dyn Generator>>,
        to: Option<Box<dyn Generator>>,
        duration: f32,
    ) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            from,
            to,
            duration,
            elapsed: 0.0,
            morphs: Vec::new(),
        }
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Weight of the incoming side, `elapsed / duration` clamped to `[0, 1]`.
    pub fn weight(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn outgoing(&self) -> Option<&dyn Generator> {
        self.from.as_deref()
    }

    pub fn incoming(&self) -> Option<&dyn Generator> {
        self.to.as_deref()
    }

    pub fn incoming_mut(&mut self) -> Option<&mut (dyn Generator + 'static)> {
        self.to.as_deref_mut()
    }

    /// Consume the transition, keeping only the incoming generator.
    pub fn into_incoming(self) -> Option<Box<dyn Generator>> {
        self.to
    }

    fn generate_side(
        side: &mut Option<Box<dyn Generator>>,
        ctx: &GenerateContext<'_>,
        out: &mut [Transform],
    ) -> Result<(), AnimError> {
        match side {
            Some(generator) => generator.generate(ctx, out),
            None => {
                out.copy_from_slice(ctx.skeleton.rest_pose());
                Ok(())
            }
        }
    }
}

impl Generator for Transition {
    fn name(&self) -> &str {
        self.to.as_deref().map(|g| g.name()).unwrap_or("")
    }

    fn advance(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.elapsed += dt;
        if let Some(from) = &mut self.from {
            from.advance(dt);
        }
        if let Some(to) = &mut self.to {
            to.advance(dt);
        }
    }

    fn generate(&mut self, ctx: &GenerateContext<'_>, out: &mut [Transform]) -> Result<(), AnimError> {
        let bones = ctx.skeleton.bone_count();
        let mut a = ctx.pool.acquire(bones)?;
        let mut b = ctx.pool.acquire(bones)?;
        Self::generate_side(&mut self.from, ctx, a.pose_mut())?;
        Self::generate_side(&mut self.to, ctx, b.pose_mut())?;
        let weight = self.weight();
        blend_poses(a.pose(), b.pose(), weight, out)?;

        let from_morphs = self.from.as_deref().map(|g| g.face_morphs()).unwrap_or(&[]);
        let to_morphs = self.to.as_deref().map(|g| g.face_morphs()).unwrap_or(&[]);
        blend_weights(from_morphs, to_morphs, weight, &mut self.morphs);
        Ok(())
    }

    fn face_morphs(&self) -> &[f32] {
        &self.morphs
    }

    fn local_time(&self) -> f32 {
        self.to.as_deref().map(|g| g.local_time()).unwrap_or(self.elapsed)
    }

    fn completed_loops(&self) -> u32 {
        self.to.as_deref().map(|g| g.completed_loops()).unwrap_or(0)
    }

    fn is_finished(&self) -> bool {
        self.to.as_deref().is_some_and(|g| g.is_finished())
    }

    fn sync_point(&self) -> SyncPoint {
        self.to.as_deref().map(|g| g.sync_point()).unwrap_or_default()
    }

    fn synchronize(&mut self, owner: &SyncPoint, max_correction: f32) {
        if let Some(to) = &mut self.to {
            to.synchronize(owner, max_correction);
        }
    }
}
