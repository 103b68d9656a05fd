#![allow(dead_code)]

use hashbrown::HashMap;
use std::sync::Arc;

use nalgebra::{Matrix4, Vector3};
use parking_lot::Mutex;
use procanim_animation_core::{ActorId, ActorResolver, Config, GraphManager, PoseConsumer};
use procanim_pose_core::{FileId, Transform};
use procanim_test_fixtures::{clips, MemorySource};

/// Every valid actor uses the "chain" skeleton, except `UNKNOWN_ACTOR`.
pub const UNKNOWN_ACTOR: ActorId = ActorId(999);

#[derive(Default)]
pub struct TestResolver {
    roots: Mutex<HashMap<ActorId, Matrix4<f32>>>,
}

impl TestResolver {
    pub fn place(&self, actor: ActorId, x: f32, y: f32, z: f32) {
        self.roots
            .lock()
            .insert(actor, Matrix4::new_translation(&Vector3::new(x, y, z)));
    }
}

impl ActorResolver for TestResolver {
    fn skeleton_name(&self, actor: ActorId) -> Option<String> {
        (actor.is_valid() && actor != UNKNOWN_ACTOR).then(|| "chain".to_string())
    }

    fn root_transform(&self, actor: ActorId) -> Option<Matrix4<f32>> {
        self.roots.lock().get(&actor).copied()
    }
}

pub struct Harness {
    pub manager: GraphManager,
    pub source: Arc<MemorySource>,
    pub resolver: Arc<TestResolver>,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let source = Arc::new(MemorySource::from_fixtures().expect("fixtures"));
    let resolver = Arc::new(TestResolver::default());
    let manager = GraphManager::new(config, source.clone(), resolver.clone());
    Harness {
        manager,
        source,
        resolver,
    }
}

pub fn clip(name: &str) -> FileId {
    clips::file_id(name).expect("clip fixture")
}

/// Consumer that ignores every pose.
pub struct Discard;

impl PoseConsumer for Discard {
    fn consume(&mut self, _actor: ActorId, _pose: &[Transform], _face_morphs: &[f32]) {}
}
