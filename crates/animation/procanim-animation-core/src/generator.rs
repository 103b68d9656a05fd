//! Pose generators: time-driven producers of one pose sample per tick.

use std::sync::Arc;

use log::warn;
use nalgebra::Matrix4;
use procanim_graph_core::{
    EvalEnv, EvalResult, EvalType, EvaluationContext, GraphSpec, PGraph, PhysicsConfig,
};
use procanim_pose_core::{
    AnimationClip, AnimationSource, FileId, PoseError, PosePool, Skeleton, Transform,
};
use serde::{Deserialize, Serialize};

use crate::error::AnimError;
use crate::sync::SyncPoint;

/// Everything a generator may touch while producing a pose.
pub struct GenerateContext<'a> {
    pub skeleton: &'a Skeleton,
    pub pool: &'a PosePool,
    /// World-space transform of the actor root.
    pub root_transform: Matrix4<f32>,
    pub physics: PhysicsConfig,
}

pub trait Generator: Send {
    /// Identifier shown in diagnostics, e.g. the clip name.
    fn name(&self) -> &str;

    fn advance(&mut self, dt: f32);

    /// Write the pose at the current local time into `out`.
    fn generate(&mut self, ctx: &GenerateContext<'_>, out: &mut [Transform]) -> Result<(), AnimError>;

    /// Morph weights sampled by the last [`generate`](Generator::generate).
    fn face_morphs(&self) -> &[f32] {
        &[]
    }

    fn local_time(&self) -> f32;

    /// Number of times playback wrapped around since the generator started.
    fn completed_loops(&self) -> u32 {
        0
    }

    /// True once a non-looping generator reached its end.
    fn is_finished(&self) -> bool {
        false
    }

    fn sync_point(&self) -> SyncPoint;

    /// Align with an owner's timing, moving by at most `max_correction` seconds.
    fn synchronize(&mut self, owner: &SyncPoint, max_correction: f32);
}

/// Plays one clip, optionally looping.
pub struct LinearClipGenerator {
    clip: Arc<AnimationClip>,
    time: f32,
    speed: f32,
    looping: bool,
    loops: u32,
    morphs: Vec<f32>,
}

impl LinearClipGenerator {
    pub fn new(clip: Arc<AnimationClip>) -> Self {
        Self {
            clip,
            time: 0.0,
            speed: 1.0,
            looping: true,
            loops: 0,
            morphs: Vec::new(),
        }
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 1.0 };
        self
    }

    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    fn period(&self) -> Option<f32> {
        self.looping.then(|| self.clip.duration())
    }
}

impl Generator for LinearClipGenerator {
    fn name(&self) -> &str {
        self.clip.name()
    }

    fn advance(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let duration = self.clip.duration();
        let raw = self.time + dt * self.speed;
        if self.looping {
            if raw >= duration {
                self.loops = self.loops.saturating_add((raw / duration).floor() as u32);
            }
            self.time = raw.rem_euclid(duration);
        } else {
            self.time = raw.min(duration);
        }
    }

    fn generate(&mut self, ctx: &GenerateContext<'_>, out: &mut [Transform]) -> Result<(), AnimError> {
        self.clip.sample(self.time, ctx.skeleton.rest_pose(), out)?;
        self.clip.sample_face(self.time, &mut self.morphs);
        Ok(())
    }

    fn face_morphs(&self) -> &[f32] {
        &self.morphs
    }

    fn local_time(&self) -> f32 {
        self.time
    }

    fn completed_loops(&self) -> u32 {
        self.loops
    }

    fn is_finished(&self) -> bool {
        !self.looping && self.time >= self.clip.duration()
    }

    fn sync_point(&self) -> SyncPoint {
        SyncPoint {
            generator_time: Some(self.time),
            period: self.period(),
            graph: None,
        }
    }

    fn synchronize(&mut self, owner: &SyncPoint, max_correction: f32) {
        let time = owner.correct_time(self.time, self.period(), max_correction);
        self.time = time.clamp(0.0, self.clip.duration());
    }
}

/// Drives a bound node graph and outputs its pose. Holds the last valid pose
/// when evaluation fails.
pub struct GraphGenerator {
    label: String,
    graph: PGraph,
    ctx: EvaluationContext,
    source: Arc<dyn AnimationSource>,
    time: f32,
    last_pose: Vec<Transform>,
    last_error: Option<AnimError>,
}

impl GraphGenerator {
    /// Bind `spec` against `skeleton`. Fails without constructing anything if
    /// binding fails or the graph does not output a pose.
    pub fn new(
        label: impl Into<String>,
        spec: &GraphSpec,
        skeleton: Arc<Skeleton>,
        source: Arc<dyn AnimationSource>,
    ) -> Result<Self, AnimError> {
        let graph = PGraph::bind(spec, skeleton, source.as_ref())?;
        if graph.output_type() != EvalType::Pose {
            return Err(AnimError::NotAPoseGraph(graph.output_type()));
        }
        let ctx = EvaluationContext::new(&graph);
        Ok(Self {
            label: label.into(),
            graph,
            ctx,
            source,
            time: 0.0,
            last_pose: Vec::new(),
            last_error: None,
        })
    }

    pub fn graph(&self) -> &PGraph {
        &self.graph
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.ctx
    }

    /// Error from the most recent failed evaluation, cleared on success.
    pub fn last_error(&self) -> Option<&AnimError> {
        self.last_error.as_ref()
    }
}

impl Generator for GraphGenerator {
    fn name(&self) -> &str {
        &self.label
    }

    fn advance(&mut self, dt: f32) {
        if self.graph.has_pending_clips() {
            self.graph.poll_pending_clips(self.source.as_ref());
        }
        self.ctx.advance_time(&self.graph, dt);
        if dt.is_finite() && dt > 0.0 {
            self.time += dt;
        }
    }

    fn generate(&mut self, ctx: &GenerateContext<'_>, out: &mut [Transform]) -> Result<(), AnimError> {
        let env = EvalEnv {
            pool: ctx.pool,
            root_transform: ctx.root_transform,
            physics: ctx.physics,
        };
        let produced = match self.ctx.evaluate_output(&self.graph, &env) {
            Ok(EvalResult::Pose(handle)) => Ok(handle),
            Ok(other) => Err(AnimError::NotAPoseGraph(other.eval_type())),
            Err(err) => Err(AnimError::from(err)),
        };
        match produced {
            Ok(handle) => {
                self.last_pose.clear();
                self.last_pose.extend_from_slice(handle.pose());
                self.last_error = None;
            }
            Err(err) => {
                warn!("graph generator '{}' holds its last pose: {err}", self.label);
                self.last_error = Some(err);
                if self.last_pose.len() != out.len() {
                    self.last_pose.clear();
                    self.last_pose.extend_from_slice(ctx.skeleton.rest_pose());
                }
            }
        }
        if self.last_pose.len() != out.len() {
            return Err(AnimError::Pose(PoseError::BoneCountMismatch {
                expected: out.len(),
                actual: self.last_pose.len(),
            }));
        }
        out.copy_from_slice(&self.last_pose);
        Ok(())
    }

    fn local_time(&self) -> f32 {
        self.time
    }

    fn sync_point(&self) -> SyncPoint {
        SyncPoint {
            generator_time: Some(self.time),
            period: None,
            graph: Some(self.ctx.snapshot(&self.graph)),
        }
    }

    fn synchronize(&mut self, owner: &SyncPoint, max_correction: f32) {
        self.time = owner.correct_time(self.time, None, max_correction);
        if let Some(snapshot) = &owner.graph {
            self.ctx.synchronize(&self.graph, snapshot, max_correction);
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_speed() -> f32 {
    1.0
}

/// Serializable description of a generator, used by sequencer phases.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorDesc {
    Clip {
        file: FileId,
        #[serde(default = "default_true")]
        looping: bool,
        #[serde(default = "default_speed")]
        speed: f32,
    },
    Graph {
        label: String,
        spec: GraphSpec,
    },
}

impl GeneratorDesc {
    pub fn clip(file: FileId) -> Self {
        GeneratorDesc::Clip {
            file,
            looping: true,
            speed: 1.0,
        }
    }
}
