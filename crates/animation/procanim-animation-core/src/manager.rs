//! Registry of per-actor graphs.
//!
//! Locking is two-level: the registry `RwLock` guards the actor → graph map
//! and each [`Graph`] sits behind its own `Mutex`. A graph lock is never taken
//! while the registry lock is held, except by the creation path and by
//! eviction (which only `try_lock`s). At most one graph lock is held at a time.

use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, trace, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use procanim_pose_core::{AnimationSource, FileId, PosePool};
use slotmap::SlotMap;

use crate::config::Config;
use crate::error::AnimError;
use crate::generator::Generator;
use crate::graph::{Graph, GraphFlags, UpdateEnv};
use crate::host::{ActorResolver, PoseConsumer};
use crate::ids::{ActorId, GraphKey};
use crate::sequencer::PhaseData;
use crate::sync::{SyncInstance, SyncRoleKind};

#[derive(Default)]
struct Registry {
    graphs: SlotMap<GraphKey, Arc<Mutex<Graph>>>,
    by_actor: HashMap<ActorId, GraphKey>,
}

/// Only the registry holds the graph, it is not locked, and it is idle.
fn evictable(graph: &Arc<Mutex<Graph>>) -> bool {
    Arc::strong_count(graph) == 1 && graph.try_lock().is_some_and(|g| g.is_idle())
}

impl Registry {
    fn handle(&self, actor: ActorId) -> Option<GraphHandle> {
        let key = *self.by_actor.get(&actor)?;
        let graph = self.graphs.get(key)?;
        Some(GraphHandle {
            key,
            actor,
            graph: Arc::clone(graph),
        })
    }

    fn remove(&mut self, actor: ActorId) -> Option<Arc<Mutex<Graph>>> {
        let key = self.by_actor.remove(&actor)?;
        self.graphs.remove(key)
    }
}

/// Lightweight reference to a registered graph. Stays usable after eviction,
/// but then no longer reaches the registry.
#[derive(Clone)]
pub struct GraphHandle {
    key: GraphKey,
    actor: ActorId,
    graph: Arc<Mutex<Graph>>,
}

impl GraphHandle {
    pub fn key(&self) -> GraphKey {
        self.key
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn lock(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    /// True if both handles refer to the same graph instance.
    pub fn same_graph(&self, other: &GraphHandle) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
    }
}

impl std::fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandle")
            .field("key", &self.key)
            .field("actor", &self.actor)
            .finish()
    }
}

pub struct GraphManager {
    registry: RwLock<Registry>,
    config: Config,
    pool: PosePool,
    source: Arc<dyn AnimationSource>,
    resolver: Arc<dyn ActorResolver>,
}

impl GraphManager {
    pub fn new(
        config: Config,
        source: Arc<dyn AnimationSource>,
        resolver: Arc<dyn ActorResolver>,
    ) -> Self {
        let pool = PosePool::new(config.pose_pool_capacity, config.pose_pool_growth);
        Self {
            registry: RwLock::new(Registry::default()),
            config,
            pool,
            source,
            resolver,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &PosePool {
        &self.pool
    }

    pub fn source(&self) -> &Arc<dyn AnimationSource> {
        &self.source
    }

    pub fn graph_count(&self) -> usize {
        self.registry.read().graphs.len()
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.registry.read().by_actor.contains_key(&actor)
    }

    fn env(&self) -> UpdateEnv<'_> {
        UpdateEnv {
            pool: &self.pool,
            source: &self.source,
            config: &self.config,
        }
    }

    /// Look up the graph of `actor`, creating it when `create` is set.
    /// Repeated calls return the same graph until it is detached or evicted.
    pub fn get_graph(&self, actor: ActorId, create: bool) -> Result<Option<GraphHandle>, AnimError> {
        if !actor.is_valid() {
            return Err(AnimError::InvalidActor(actor));
        }
        if let Some(handle) = self.registry.read().handle(actor) {
            return Ok(Some(handle));
        }
        if !create {
            return Ok(None);
        }

        let mut registry = self.registry.write();
        // Another thread may have won the race between the two locks.
        if let Some(handle) = registry.handle(actor) {
            return Ok(Some(handle));
        }
        let name = self
            .resolver
            .skeleton_name(actor)
            .ok_or_else(|| AnimError::SkeletonNotFound(actor.to_string()))?;
        let skeleton = self
            .source
            .skeleton(&name)
            .ok_or(AnimError::SkeletonNotFound(name))?;
        let mut graph = Graph::new(actor, skeleton);
        if let Some(root) = self.resolver.root_transform(actor) {
            graph.set_root_transform(root);
        }
        let graph = Arc::new(Mutex::new(graph));
        let key = registry.graphs.insert(Arc::clone(&graph));
        registry.by_actor.insert(actor, key);
        debug!("{actor}: graph created");
        Ok(Some(GraphHandle { key, actor, graph }))
    }

    fn create(&self, actor: ActorId) -> Result<GraphHandle, AnimError> {
        self.get_graph(actor, true)?
            .ok_or(AnimError::GraphNotFound(actor))
    }

    fn require(&self, actor: ActorId) -> Result<GraphHandle, AnimError> {
        self.get_graph(actor, false)?
            .ok_or(AnimError::GraphNotFound(actor))
    }

    /// Run `f` on the locked graph of `actor`. A missing graph is created and
    /// given a zero-delta update first so its pose is populated.
    pub fn visit_graph<R>(&self, actor: ActorId, f: impl FnOnce(&mut Graph) -> R) -> Result<R, AnimError> {
        let existed = self.contains(actor);
        let handle = self.create(actor)?;
        let mut graph = handle.lock();
        if !existed {
            if let Err(err) = graph.update(0.0, &self.env()) {
                warn!("{actor}: initial update failed: {err}");
            }
        }
        Ok(f(&mut graph))
    }

    fn refresh_root(&self, graph: &mut Graph) {
        if graph.sync_role() == SyncRoleKind::Follower {
            return;
        }
        if let Some(root) = self.resolver.root_transform(graph.actor()) {
            graph.set_root_transform(root);
        }
    }

    /// Tick a single actor, creating its graph on first use. When eviction is
    /// enabled, a graph the tick left idle is evicted right away.
    pub fn update_actor(&self, actor: ActorId, dt: f32) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        let (result, idle) = {
            let mut graph = handle.lock();
            self.refresh_root(&mut graph);
            let result = graph.update(dt, &self.env());
            (result, graph.is_idle())
        };
        if idle && self.config.evict_idle_graphs {
            let key = handle.key();
            drop(handle);
            self.evict_if_idle(actor, key);
        }
        result
    }

    /// Tick every registered graph, sync owners first, handing each pose to
    /// `consumer` while the graph is locked. Returns the number of graphs ticked.
    ///
    /// `consumer` must not call back into this manager for the actor it is
    /// handed.
    pub fn update_all(&self, dt: f32, consumer: &mut dyn PoseConsumer) -> usize {
        let handles: Vec<GraphHandle> = {
            let registry = self.registry.read();
            registry
                .by_actor
                .keys()
                .filter_map(|actor| registry.handle(*actor))
                .collect()
        };
        let (owners, others): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .partition(|h| h.lock().sync_role() == SyncRoleKind::Owner);

        let env = self.env();
        let mut ticked = 0;
        for handle in owners.into_iter().chain(others) {
            let mut graph = handle.lock();
            self.refresh_root(&mut graph);
            if let Err(err) = graph.update(dt, &env) {
                trace!("{}: tick failed: {err}", handle.actor);
            }
            consumer.consume(handle.actor, graph.pose(), graph.face_morphs());
            ticked += 1;
        }

        if self.config.evict_idle_graphs {
            self.evict_idle();
        }
        ticked
    }

    /// Remove graphs with no animation content and no keep-alive flag.
    /// Graphs that are locked, or reachable through an outstanding
    /// [`GraphHandle`], are skipped until the next check.
    pub fn evict_idle(&self) -> usize {
        let evicted: Vec<(ActorId, Arc<Mutex<Graph>>)> = {
            let mut registry = self.registry.write();
            let idle: Vec<ActorId> = registry
                .by_actor
                .iter()
                .filter(|(_, key)| registry.graphs.get(**key).is_some_and(evictable))
                .map(|(actor, _)| *actor)
                .collect();
            idle.into_iter()
                .filter_map(|actor| registry.remove(actor).map(|g| (actor, g)))
                .collect()
        };
        let count = evicted.len();
        self.retire(evicted);
        count
    }

    /// Evict the graph in slot `key` of `actor` if it is still idle.
    fn evict_if_idle(&self, actor: ActorId, key: GraphKey) {
        let evicted = {
            let mut registry = self.registry.write();
            let current = registry.by_actor.get(&actor) == Some(&key);
            if !current || !registry.graphs.get(key).is_some_and(evictable) {
                return;
            }
            registry.remove(actor)
        };
        if let Some(graph) = evicted {
            self.retire(vec![(actor, graph)]);
        }
    }

    fn retire(&self, evicted: Vec<(ActorId, Arc<Mutex<Graph>>)>) {
        for (actor, graph) in evicted {
            let retired = graph.lock().leave_sync();
            if let Some(retired) = retired {
                self.release_followers(&retired);
            }
            debug!("{actor}: idle graph evicted");
        }
    }

    /// Load `file` on `actor` and blend to it over `transition_time` seconds.
    /// Creates the graph if needed and detaches any running sequence.
    pub fn load_and_start_animation(
        &self,
        actor: ActorId,
        file: FileId,
        transition_time: f32,
    ) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        let mut graph = handle.lock();
        graph.load_and_start(file, transition_time, self.source.as_ref())
    }

    pub fn start_sequence(&self, actor: ActorId, phases: Vec<PhaseData>) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        let mut graph = handle.lock();
        graph.start_sequence(phases, &self.source);
        Ok(())
    }

    /// Flag the running sequence to move to its next phase on the next tick.
    pub fn advance_sequence(&self, actor: ActorId, smooth: bool) -> Result<(), AnimError> {
        let handle = self.require(actor)?;
        let mut graph = handle.lock();
        if graph.advance_sequence(smooth) {
            Ok(())
        } else {
            Err(AnimError::NoSequencer(actor))
        }
    }

    pub fn attach_generator(
        &self,
        actor: ActorId,
        generator: Box<dyn Generator>,
        transition_time: f32,
    ) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        handle.lock().attach_generator(generator, transition_time);
        Ok(())
    }

    pub fn detach_generator(&self, actor: ActorId, transition_time: f32) -> Result<(), AnimError> {
        let handle = self.require(actor)?;
        handle.lock().detach_generator(transition_time);
        Ok(())
    }

    /// Drop the graph of `actor` regardless of its state. Returns whether one existed.
    pub fn detach_graph(&self, actor: ActorId) -> Result<bool, AnimError> {
        if !actor.is_valid() {
            return Err(AnimError::InvalidActor(actor));
        }
        let Some(graph) = self.registry.write().remove(actor) else {
            return Ok(false);
        };
        let retired = graph.lock().leave_sync();
        if let Some(retired) = retired {
            self.release_followers(&retired);
        }
        debug!("{actor}: graph detached");
        Ok(true)
    }

    /// Drop every graph.
    pub fn reset(&self) {
        let graphs: Vec<Arc<Mutex<Graph>>> = {
            let mut registry = self.registry.write();
            registry.by_actor.clear();
            registry.graphs.drain().map(|(_, g)| g).collect()
        };
        for graph in &graphs {
            graph.lock().leave_sync();
        }
        debug!("registry reset, {} graphs dropped", graphs.len());
    }

    /// Make `actors[0]` the owner and the rest its followers. Followers take the
    /// owner's root transform and timing on every tick until they stop syncing.
    pub fn sync_graphs(&self, actors: &[ActorId]) -> Result<SyncInstance, AnimError> {
        if actors.len() < 2 {
            return Err(AnimError::NotEnoughActors {
                count: actors.len(),
            });
        }
        if let Some(bad) = actors.iter().find(|a| !a.is_valid()) {
            return Err(AnimError::InvalidActor(*bad));
        }
        let owner = actors[0];
        let handles = actors
            .iter()
            .map(|a| self.create(*a))
            .collect::<Result<Vec<_>, _>>()?;

        let (instance, retired) = {
            let mut graph = handles[0].lock();
            self.refresh_root(&mut graph);
            graph.make_sync_owner()
        };
        if let Some(retired) = retired {
            self.release_followers(&retired);
        }

        for handle in &handles[1..] {
            if handle.actor == owner {
                continue;
            }
            let retired = handle.lock().sync_to(&instance);
            if let Some(retired) = retired {
                self.release_followers(&retired);
            }
        }
        debug!("{owner}: syncing {} followers", instance.lock().followers.len());
        Ok(instance)
    }

    /// Leave the sync group of `actor`. Stopping an owner releases all of its
    /// followers to independent playback.
    pub fn stop_syncing(&self, actor: ActorId) -> Result<(), AnimError> {
        let handle = self.require(actor)?;
        let retired = handle.lock().leave_sync();
        if let Some(retired) = retired {
            self.release_followers(&retired);
        }
        debug!("{actor}: stopped syncing");
        Ok(())
    }

    fn release_followers(&self, instance: &SyncInstance) {
        let followers = std::mem::take(&mut instance.lock().followers);
        for follower in followers {
            if let Ok(Some(handle)) = self.get_graph(follower, false) {
                if handle.lock().release_from(instance) {
                    trace!("{follower}: released from sync group");
                }
            }
        }
    }

    /// Ask for the cached eye transforms of `actor` to be refreshed next tick.
    pub fn request_eye_track_update(&self, actor: ActorId) -> Result<(), AnimError> {
        let handle = self.require(actor)?;
        handle
            .lock()
            .set_flag(GraphFlags::REQUIRES_EYE_TRACK_UPDATE, true);
        Ok(())
    }

    pub fn set_persistent(&self, actor: ActorId, persistent: bool) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        handle.lock().set_flag(GraphFlags::PERSISTENT, persistent);
        Ok(())
    }

    pub fn set_ik_chains_active(&self, actor: ActorId, active: bool) -> Result<(), AnimError> {
        let handle = self.create(actor)?;
        handle.lock().set_flag(GraphFlags::ACTIVE_IK_CHAINS, active);
        Ok(())
    }
}
