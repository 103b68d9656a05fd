//! Per-actor animation state and its tick.
//!
//! A [`Graph`] owns the current generator, the in-flight transition, an
//! optional sequencer and the actor's synchronization role. One tick:
//!
//! 1. poll pending clip loads (direct requests and sequencer phases)
//! 2. apply sequencer advance requests or automatic phase completion
//! 3. advance the transition or generator by `dt`, collapsing a finished transition
//! 4. followers pull root transform and timing from their owner; owners publish theirs
//! 5. generate the pose (the previous pose is kept if this fails)
//! 6. refresh eye tracking when requested, then recompute the keep-alive flags

use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, trace, warn};
use nalgebra::Matrix4;
use procanim_pose_core::{
    AnimationClip, AnimationSource, ClipRequest, FileId, PosePool, Skeleton, Transform,
};

use crate::config::Config;
use crate::error::AnimError;
use crate::generator::{
    GenerateContext, Generator, GeneratorDesc, GraphGenerator, LinearClipGenerator,
};
use crate::ids::ActorId;
use crate::sequencer::{PhaseData, Sequencer};
use crate::sync::{self, SyncInstance, SyncRole, SyncRoleKind};
use crate::transition::Transition;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GraphFlags: u16 {
        /// Never evict, even without animation state.
        const PERSISTENT = 1 << 0;
        const ACTIVE_IK_CHAINS = 1 << 1;
        const HAS_GENERATOR = 1 << 2;
        const TRANSITIONING = 1 << 3;
        const LOADING_ANIMATION = 1 << 4;
        const LOADING_SEQUENCER_ANIMATION = 1 << 5;
        /// Recompute cached eye transforms on the next tick.
        const REQUIRES_EYE_TRACK_UPDATE = 1 << 6;

        const KEEP_ALIVE = Self::PERSISTENT.bits()
            | Self::ACTIVE_IK_CHAINS.bits()
            | Self::HAS_GENERATOR.bits()
            | Self::TRANSITIONING.bits()
            | Self::LOADING_ANIMATION.bits()
            | Self::LOADING_SEQUENCER_ANIMATION.bits();
    }
}

/// Shared services handed to [`Graph::update`].
pub struct UpdateEnv<'a> {
    pub pool: &'a PosePool,
    pub source: &'a Arc<dyn AnimationSource>,
    pub config: &'a Config,
}

/// Clip request waiting on the asset layer.
#[derive(Clone, Debug)]
struct PendingLoad {
    file: FileId,
    transition_time: f32,
    looping: bool,
    speed: f32,
}

impl PendingLoad {
    fn start(&self, clip: Arc<AnimationClip>) -> Box<dyn Generator> {
        Box::new(
            LinearClipGenerator::new(clip)
                .with_looping(self.looping)
                .with_speed(self.speed),
        )
    }
}

pub struct Graph {
    actor: ActorId,
    skeleton: Arc<Skeleton>,
    flags: GraphFlags,
    generator: Option<Box<dyn Generator>>,
    transition: Option<Transition>,
    sequencer: Option<Sequencer>,
    pending_load: Option<PendingLoad>,
    pending_phase: Option<PendingLoad>,
    sync: SyncRole,
    root_transform: Matrix4<f32>,
    pose: Vec<Transform>,
    morphs: Vec<f32>,
    eye_transforms: [Option<Matrix4<f32>>; 2],
    last_error: Option<AnimError>,
}

impl Graph {
    pub fn new(actor: ActorId, skeleton: Arc<Skeleton>) -> Self {
        let pose = skeleton.rest_pose().to_vec();
        Self {
            actor,
            skeleton,
            flags: GraphFlags::empty(),
            generator: None,
            transition: None,
            sequencer: None,
            pending_load: None,
            pending_phase: None,
            sync: SyncRole::None,
            root_transform: Matrix4::identity(),
            pose,
            morphs: Vec::new(),
            eye_transforms: [None, None],
            last_error: None,
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn flags(&self) -> GraphFlags {
        self.flags
    }

    pub fn set_flag(&mut self, flag: GraphFlags, on: bool) {
        self.flags.set(flag, on);
    }

    /// Last successfully generated pose, in skeleton bone order.
    pub fn pose(&self) -> &[Transform] {
        &self.pose
    }

    /// Morph weights sampled alongside [`pose`](Self::pose); empty without face data.
    pub fn face_morphs(&self) -> &[f32] {
        &self.morphs
    }

    pub fn root_transform(&self) -> &Matrix4<f32> {
        &self.root_transform
    }

    pub fn set_root_transform(&mut self, root: Matrix4<f32>) {
        self.root_transform = root;
    }

    /// World-space transforms of the left and right eye bones, as of the last refresh.
    pub fn eye_transforms(&self) -> (Option<Matrix4<f32>>, Option<Matrix4<f32>>) {
        (self.eye_transforms[0], self.eye_transforms[1])
    }

    pub fn generator(&self) -> Option<&dyn Generator> {
        self.generator.as_deref()
    }

    pub fn transition(&self) -> Option<&Transition> {
        self.transition.as_ref()
    }

    pub fn transition_weight(&self) -> Option<f32> {
        self.transition.as_ref().map(Transition::weight)
    }

    pub fn sequencer(&self) -> Option<&Sequencer> {
        self.sequencer.as_ref()
    }

    pub fn sync_role(&self) -> SyncRoleKind {
        self.sync.kind()
    }

    pub fn sync_instance(&self) -> Option<&SyncInstance> {
        self.sync.instance()
    }

    pub fn last_error(&self) -> Option<&AnimError> {
        self.last_error.as_ref()
    }

    /// Name of the generator that is, or is becoming, active.
    pub fn generator_name(&self) -> Option<&str> {
        self.current_generator().map(|g| g.name())
    }

    /// True when nothing keeps this graph alive.
    pub fn is_idle(&self) -> bool {
        !self.flags.intersects(GraphFlags::KEEP_ALIVE)
            && self.sequencer.is_none()
            && self.generator.is_none()
            && self.transition.is_none()
    }

    fn current_generator(&self) -> Option<&dyn Generator> {
        match &self.transition {
            Some(t) => t.incoming(),
            None => self.generator.as_deref(),
        }
    }

    fn active_generator(&self) -> Option<&dyn Generator> {
        match (&self.transition, &self.generator) {
            (Some(t), _) => Some(t as &dyn Generator),
            (None, Some(g)) => Some(g.as_ref()),
            (None, None) => None,
        }
    }

    fn active_generator_mut(&mut self) -> Option<&mut dyn Generator> {
        match (&mut self.transition, &mut self.generator) {
            (Some(t), _) => Some(t as &mut dyn Generator),
            (None, Some(g)) => Some(g.as_mut()),
            (None, None) => None,
        }
    }

    fn refresh_flags(&mut self) {
        self.flags
            .set(GraphFlags::HAS_GENERATOR, self.generator.is_some());
        self.flags
            .set(GraphFlags::TRANSITIONING, self.transition.is_some());
    }

    /// Blend from whatever is active now to `incoming` over `duration`
    /// seconds. A zero duration swaps immediately.
    pub fn start_transition(&mut self, incoming: Option<Box<dyn Generator>>, duration: f32) {
        let outgoing: Option<Box<dyn Generator>> = match self.transition.take() {
            Some(in_flight) => Some(Box::new(in_flight)),
            None => self.generator.take(),
        };
        if !(duration.is_finite() && duration > 0.0) || (outgoing.is_none() && incoming.is_none()) {
            self.generator = incoming;
        } else {
            self.transition = Some(Transition::new(outgoing, incoming, duration));
        }
        self.refresh_flags();
    }

    fn detach_sequencer(&mut self) {
        if self.sequencer.take().is_some() {
            debug!("{}: sequencer detached", self.actor);
        }
        self.pending_phase = None;
        self.flags.remove(GraphFlags::LOADING_SEQUENCER_ANIMATION);
    }

    fn clear_pending_load(&mut self) {
        self.pending_load = None;
        self.flags.remove(GraphFlags::LOADING_ANIMATION);
    }

    /// Request `file` and transition to it once loaded. Any sequencer is detached.
    pub fn load_and_start(
        &mut self,
        file: FileId,
        transition_time: f32,
        source: &dyn AnimationSource,
    ) -> Result<(), AnimError> {
        let pending = PendingLoad {
            file,
            transition_time,
            looping: true,
            speed: 1.0,
        };
        match source.request_clip(&pending.file, &self.skeleton) {
            ClipRequest::Missing => Err(AnimError::ClipNotFound(pending.file)),
            ClipRequest::Ready(clip) => {
                self.detach_sequencer();
                self.clear_pending_load();
                self.start_transition(Some(pending.start(clip)), transition_time);
                Ok(())
            }
            ClipRequest::Pending => {
                debug!("{}: waiting for clip {}", self.actor, pending.file);
                self.detach_sequencer();
                self.pending_load = Some(pending);
                self.flags.insert(GraphFlags::LOADING_ANIMATION);
                Ok(())
            }
        }
    }

    pub fn attach_generator(&mut self, generator: Box<dyn Generator>, transition_time: f32) {
        self.detach_sequencer();
        self.clear_pending_load();
        self.start_transition(Some(generator), transition_time);
    }

    /// Fade out to no generator. Safe to call repeatedly.
    pub fn detach_generator(&mut self, transition_time: f32) {
        self.clear_pending_load();
        self.detach_sequencer();
        self.start_transition(None, transition_time);
    }

    /// Replace any sequencer with one built from `phases` and start its first
    /// phase. An empty list completes immediately and clears the generator.
    pub fn start_sequence(&mut self, phases: Vec<PhaseData>, source: &Arc<dyn AnimationSource>) {
        self.detach_sequencer();
        self.clear_pending_load();
        let Some(sequencer) = Sequencer::new(phases) else {
            debug!("{}: empty sequence completes immediately", self.actor);
            self.start_transition(None, 0.0);
            return;
        };
        let first = sequencer.current_phase().clone();
        debug!(
            "{}: sequence started with {} phases",
            self.actor,
            sequencer.phases().len()
        );
        self.sequencer = Some(sequencer);
        self.start_phase(&first, first.transition_time, source);
    }

    /// Ask the sequencer to move on at the next tick. `false` without a sequencer.
    pub fn advance_sequence(&mut self, smooth: bool) -> bool {
        match &mut self.sequencer {
            Some(sequencer) => {
                sequencer.request_advance(smooth);
                true
            }
            None => false,
        }
    }

    fn skip_phase(&mut self) {
        if let Some(sequencer) = &mut self.sequencer {
            sequencer.request_advance(false);
        }
    }

    fn start_phase(&mut self, phase: &PhaseData, time: f32, source: &Arc<dyn AnimationSource>) {
        match &phase.generator {
            GeneratorDesc::Clip {
                file,
                looping,
                speed,
            } => {
                let pending = PendingLoad {
                    file: file.clone(),
                    transition_time: time,
                    looping: *looping,
                    speed: *speed,
                };
                match source.request_clip(file, &self.skeleton) {
                    ClipRequest::Ready(clip) => {
                        self.start_transition(Some(pending.start(clip)), time);
                    }
                    ClipRequest::Pending => {
                        self.pending_phase = Some(pending);
                        self.flags.insert(GraphFlags::LOADING_SEQUENCER_ANIMATION);
                    }
                    ClipRequest::Missing => {
                        warn!("{}: phase clip {file} is missing, skipping phase", self.actor);
                        self.last_error = Some(AnimError::ClipNotFound(file.clone()));
                        self.skip_phase();
                    }
                }
            }
            GeneratorDesc::Graph { label, spec } => {
                match GraphGenerator::new(
                    label.clone(),
                    spec,
                    Arc::clone(&self.skeleton),
                    Arc::clone(source),
                ) {
                    Ok(generator) => self.start_transition(Some(Box::new(generator)), time),
                    Err(err) => {
                        warn!("{}: phase graph '{label}' failed to bind: {err}", self.actor);
                        self.last_error = Some(err);
                        self.skip_phase();
                    }
                }
            }
        }
    }

    fn poll_pending_load(&mut self, source: &dyn AnimationSource) {
        if !self.flags.contains(GraphFlags::LOADING_ANIMATION) {
            return;
        }
        let Some(pending) = self.pending_load.clone() else {
            self.flags.remove(GraphFlags::LOADING_ANIMATION);
            return;
        };
        match source.request_clip(&pending.file, &self.skeleton) {
            ClipRequest::Pending => {}
            ClipRequest::Ready(clip) => {
                debug!("{}: clip {} loaded", self.actor, pending.file);
                self.clear_pending_load();
                self.start_transition(Some(pending.start(clip)), pending.transition_time);
            }
            ClipRequest::Missing => {
                warn!("{}: clip {} could not be loaded", self.actor, pending.file);
                self.last_error = Some(AnimError::ClipNotFound(pending.file));
                self.clear_pending_load();
            }
        }
    }

    fn poll_pending_phase(&mut self, source: &dyn AnimationSource) {
        let Some(pending) = self.pending_phase.clone() else {
            self.flags.remove(GraphFlags::LOADING_SEQUENCER_ANIMATION);
            return;
        };
        match source.request_clip(&pending.file, &self.skeleton) {
            ClipRequest::Pending => {}
            ClipRequest::Ready(clip) => {
                self.pending_phase = None;
                self.flags.remove(GraphFlags::LOADING_SEQUENCER_ANIMATION);
                self.start_transition(Some(pending.start(clip)), pending.transition_time);
            }
            ClipRequest::Missing => {
                warn!("{}: phase clip {} could not be loaded", self.actor, pending.file);
                self.last_error = Some(AnimError::ClipNotFound(pending.file));
                self.pending_phase = None;
                self.flags.remove(GraphFlags::LOADING_SEQUENCER_ANIMATION);
                self.skip_phase();
            }
        }
    }

    fn update_sequencer(&mut self, source: &Arc<dyn AnimationSource>) {
        if self.flags.contains(GraphFlags::LOADING_SEQUENCER_ANIMATION) {
            self.poll_pending_phase(source.as_ref());
            return;
        }
        let (request, loops) = match &mut self.sequencer {
            Some(sequencer) => (
                sequencer.take_advance_request(),
                sequencer.current_phase().loops,
            ),
            None => return,
        };
        let completed = loops.is_some_and(|n| {
            self.current_generator()
                .is_some_and(|g| g.completed_loops() >= n || g.is_finished())
        });
        if request.is_none() && !completed {
            return;
        }
        // Automatic completion always blends.
        let smooth = request.unwrap_or(true);

        let Some(sequencer) = &mut self.sequencer else {
            return;
        };
        let last_time = sequencer.current_phase().transition_time;
        let next = sequencer.step().cloned();
        match next {
            Some(phase) => {
                debug!(
                    "{}: sequence advanced to phase {}",
                    self.actor,
                    sequencer.current_index()
                );
                let time = if smooth { phase.transition_time } else { 0.0 };
                self.start_phase(&phase, time, source);
            }
            None => {
                debug!("{}: sequence finished", self.actor);
                self.sequencer = None;
                self.start_transition(None, if smooth { last_time } else { 0.0 });
            }
        }
    }

    /// Become the owner of a fresh sync instance, leaving any previous role.
    /// Also returns the instance this graph previously owned, if any, so the
    /// caller can release its followers.
    pub fn make_sync_owner(&mut self) -> (SyncInstance, Option<SyncInstance>) {
        let retired = self.leave_sync();
        let instance = sync::new_instance(self.actor, self.root_transform);
        self.sync = SyncRole::Owner(Arc::clone(&instance));
        self.publish_to_followers();
        debug!("{}: now owns a sync group", self.actor);
        (instance, retired)
    }

    /// Follow `instance`, snapping to the owner's current root and timing.
    pub fn sync_to(&mut self, instance: &SyncInstance) -> Option<SyncInstance> {
        let retired = self.leave_sync();
        let (root, point) = {
            let mut data = instance.lock();
            if !data.followers.contains(&self.actor) {
                data.followers.push(self.actor);
            }
            (data.root_transform, data.point.clone())
        };
        self.root_transform = root;
        if let Some(active) = self.active_generator_mut() {
            active.synchronize(&point, f32::INFINITY);
        }
        self.sync = SyncRole::Follower(Arc::clone(instance));
        debug!("{}: now following", self.actor);
        retired
    }

    /// Drop any sync role. An owner marks its instance inactive and returns
    /// it; its follower list is left for the caller to release.
    pub fn leave_sync(&mut self) -> Option<SyncInstance> {
        match std::mem::take(&mut self.sync) {
            SyncRole::None => None,
            SyncRole::Follower(instance) => {
                instance.lock().followers.retain(|a| *a != self.actor);
                None
            }
            SyncRole::Owner(instance) => {
                instance.lock().active = false;
                Some(instance)
            }
        }
    }

    /// Stop following `instance`, if that is what this graph follows.
    pub fn release_from(&mut self, instance: &SyncInstance) -> bool {
        match &self.sync {
            SyncRole::Follower(current) if Arc::ptr_eq(current, instance) => {
                self.sync = SyncRole::None;
                true
            }
            _ => false,
        }
    }

    fn follow_owner(&mut self, max_correction: f32) {
        let SyncRole::Follower(instance) = &self.sync else {
            return;
        };
        let (active, root, point) = {
            let data = instance.lock();
            (data.active, data.root_transform, data.point.clone())
        };
        if !active {
            debug!("{}: owner stopped syncing, playing independently", self.actor);
            self.sync = SyncRole::None;
            return;
        }
        self.root_transform = root;
        if let Some(generator) = self.active_generator_mut() {
            generator.synchronize(&point, max_correction);
        }
    }

    fn publish_to_followers(&self) {
        let SyncRole::Owner(instance) = &self.sync else {
            return;
        };
        let point = self
            .active_generator()
            .map(|g| g.sync_point())
            .unwrap_or_default();
        let mut data = instance.lock();
        data.root_transform = self.root_transform;
        data.point = point;
    }

    fn evaluate_pose(&mut self, env: &UpdateEnv<'_>) -> Result<(), AnimError> {
        let bones = self.skeleton.bone_count();
        let ctx = GenerateContext {
            skeleton: &self.skeleton,
            pool: env.pool,
            root_transform: self.root_transform,
            physics: env.config.physics(),
        };
        let active: &mut dyn Generator = match (&mut self.transition, &mut self.generator) {
            (Some(t), _) => t,
            (None, Some(g)) => g.as_mut(),
            (None, None) => {
                self.pose.copy_from_slice(self.skeleton.rest_pose());
                self.morphs.clear();
                return Ok(());
            }
        };
        let mut out = env.pool.acquire(bones)?;
        active.generate(&ctx, out.pose_mut())?;
        self.pose.copy_from_slice(out.pose());
        self.morphs.clear();
        self.morphs.extend_from_slice(active.face_morphs());
        Ok(())
    }

    fn refresh_eye_tracking(&mut self) {
        if !self.flags.contains(GraphFlags::REQUIRES_EYE_TRACK_UPDATE) {
            return;
        }
        let (left, right) = self.skeleton.eye_bones();
        let world = |bone: Option<usize>| {
            bone.and_then(|b| self.skeleton.model_transform(&self.pose, b).ok())
                .map(|m| self.root_transform * m)
        };
        let eyes = [world(left), world(right)];
        self.eye_transforms = eyes;
        self.flags.remove(GraphFlags::REQUIRES_EYE_TRACK_UPDATE);
    }

    /// Advance all animation state by `dt` seconds and regenerate the pose.
    /// On error the previous pose is kept.
    pub fn update(&mut self, dt: f32, env: &UpdateEnv<'_>) -> Result<(), AnimError> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.poll_pending_load(env.source.as_ref());
        self.update_sequencer(env.source);

        if let Some(active) = self.active_generator_mut() {
            active.advance(dt);
        }
        if self.transition.as_ref().is_some_and(Transition::is_complete) {
            if let Some(done) = self.transition.take() {
                trace!("{}: transition complete", self.actor);
                self.generator = done.into_incoming();
            }
        }

        self.follow_owner(env.config.max_sync_correction(dt));
        self.publish_to_followers();

        let result = self.evaluate_pose(env);
        if let Err(err) = &result {
            warn!("{}: keeping last pose: {err}", self.actor);
            self.last_error = Some(err.clone());
        }
        self.refresh_eye_tracking();
        self.refresh_flags();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncPoint;
    use procanim_test_fixtures::{skeletons, MemorySource};

    /// Holds the rest pose with the root lifted to `height`.
    struct Lift {
        name: &'static str,
        height: f32,
        time: f32,
    }

    impl Lift {
        fn boxed(name: &'static str, height: f32) -> Box<dyn Generator> {
            Box::new(Lift {
                name,
                height,
                time: 0.0,
            })
        }
    }

    impl Generator for Lift {
        fn name(&self) -> &str {
            self.name
        }

        fn advance(&mut self, dt: f32) {
            self.time += dt;
        }

        fn generate(&mut self, ctx: &GenerateContext<'_>, out: &mut [Transform]) -> Result<(), AnimError> {
            out.copy_from_slice(ctx.skeleton.rest_pose());
            out[0].translation.y = self.height;
            Ok(())
        }

        fn local_time(&self) -> f32 {
            self.time
        }

        fn sync_point(&self) -> SyncPoint {
            SyncPoint::default()
        }

        fn synchronize(&mut self, _owner: &SyncPoint, _max_correction: f32) {}
    }

    fn graph() -> Graph {
        Graph::new(ActorId(7), skeletons::shared("chain").expect("chain skeleton"))
    }

    fn tick(graph: &mut Graph, dt: f32) {
        let pool = PosePool::new(8, false);
        let source: Arc<dyn AnimationSource> = Arc::new(MemorySource::new());
        let config = Config::default();
        let env = UpdateEnv {
            pool: &pool,
            source: &source,
            config: &config,
        };
        graph.update(dt, &env).expect("tick");
    }

    #[test]
    fn new_graph_is_idle_at_rest() {
        let g = graph();
        assert!(g.is_idle());
        assert_eq!(g.pose(), g.skeleton().rest_pose());
        assert_eq!(g.sync_role(), SyncRoleKind::None);
    }

    #[test]
    fn keep_alive_flags_block_idleness() {
        let mut g = graph();
        g.set_flag(GraphFlags::REQUIRES_EYE_TRACK_UPDATE, true);
        assert!(g.is_idle());
        g.set_flag(GraphFlags::PERSISTENT, true);
        assert!(!g.is_idle());
    }

    #[test]
    fn zero_duration_swaps_without_transition() {
        let mut g = graph();
        g.start_transition(Some(Lift::boxed("up", 1.0)), 0.0);
        assert!(g.transition().is_none());
        assert!(g.flags().contains(GraphFlags::HAS_GENERATOR));
        tick(&mut g, 0.1);
        assert_eq!(g.pose()[0].translation.y, 1.0);
    }

    #[test]
    fn retargeting_mid_transition_blends_from_the_blend() {
        let mut g = graph();
        g.start_transition(Some(Lift::boxed("up", 1.0)), 0.2);
        tick(&mut g, 0.1);
        assert!((g.pose()[0].translation.y - 0.5).abs() < 1e-5);

        g.start_transition(Some(Lift::boxed("down", -1.0)), 0.2);
        let outgoing = g.transition().and_then(|t| t.outgoing()).map(|o| o.name());
        // The in-flight transition is named after its incoming side.
        assert_eq!(outgoing, Some("up"));
        tick(&mut g, 0.1);
        // Outgoing blend is now at 0.2/0.2 -> 1.0; incoming weight 0.5.
        assert!(g.pose()[0].translation.y.abs() < 1e-5);

        tick(&mut g, 0.1);
        assert!(g.transition().is_none());
        assert_eq!(g.generator_name(), Some("down"));
        assert_eq!(g.pose()[0].translation.y, -1.0);
    }

    #[test]
    fn fade_out_returns_to_rest() {
        let mut g = graph();
        g.start_transition(Some(Lift::boxed("up", 1.0)), 0.0);
        g.detach_generator(0.1);
        assert!(!g.is_idle());
        tick(&mut g, 0.1);
        assert!(g.is_idle());
        assert_eq!(g.pose(), g.skeleton().rest_pose());
    }
}
