use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use procanim_pose_core::{
    AnimationClip, AnimationSource, ClipRequest, FileId, RawAnimationClip, Skeleton,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    skeletons: HashMap<String, String>,
    clips: HashMap<String, ClipEntry>,
    #[serde(rename = "node-graphs")]
    node_graphs: HashMap<String, NodeGraphEntry>,
}

#[derive(Debug, Deserialize)]
struct ClipEntry {
    file: String,
    anim: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct NodeGraphEntry {
    spec: String,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod skeletons {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.skeletons.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.skeletons, "skeleton", name)?)
    }

    pub fn load(name: &str) -> Result<Skeleton> {
        super::load_json(lookup(&MANIFEST.skeletons, "skeleton", name)?)
    }

    pub fn shared(name: &str) -> Result<Arc<Skeleton>> {
        load(name).map(Arc::new)
    }
}

pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clips.keys().cloned().collect()
    }

    pub fn raw(name: &str) -> Result<RawAnimationClip> {
        let entry = lookup(&MANIFEST.clips, "clip", name)?;
        super::load_json(&entry.path)
    }

    /// Address under which [`MemorySource::from_fixtures`] serves the clip.
    pub fn file_id(name: &str) -> Result<FileId> {
        let entry = lookup(&MANIFEST.clips, "clip", name)?;
        Ok(FileId::new(&entry.file, &entry.anim))
    }

    pub fn build(name: &str, skeleton: &Skeleton) -> Result<Arc<AnimationClip>> {
        let clip = AnimationClip::build(raw(name)?, skeleton)
            .with_context(|| format!("clip fixture '{name}' does not fit '{}'", skeleton.name()))?;
        Ok(Arc::new(clip))
    }
}

pub mod node_graphs {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.node_graphs.keys().cloned().collect()
    }

    pub fn spec_json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.node_graphs, "node graph", name)?;
        read_to_string(&entry.spec)
    }

    pub fn spec<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.node_graphs, "node graph", name)?;
        super::load_json(&entry.spec)
    }
}

#[derive(Default)]
struct SourceState {
    skeletons: HashMap<String, Arc<Skeleton>>,
    raw: HashMap<FileId, RawAnimationClip>,
    built: HashMap<(FileId, String), Arc<AnimationClip>>,
    delays: HashMap<FileId, u32>,
    requests: HashMap<FileId, usize>,
}

/// In-memory [`AnimationSource`] with optional simulated loading latency.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<SourceState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every skeleton and clip listed in the fixtures manifest.
    pub fn from_fixtures() -> Result<Self> {
        let source = Self::new();
        for name in skeletons::keys() {
            source.insert_skeleton(skeletons::shared(&name)?);
        }
        for name in clips::keys() {
            source.insert_clip(clips::file_id(&name)?, clips::raw(&name)?);
        }
        Ok(source)
    }

    pub fn insert_skeleton(&self, skeleton: Arc<Skeleton>) {
        self.state
            .lock()
            .skeletons
            .insert(skeleton.name().to_string(), skeleton);
    }

    pub fn insert_clip(&self, id: FileId, raw: RawAnimationClip) {
        let mut state = self.state.lock();
        state.built.retain(|(built_id, _), _| *built_id != id);
        state.raw.insert(id, raw);
    }

    /// Answer `Pending` for the next `polls` requests of `id`.
    pub fn delay(&self, id: FileId, polls: u32) {
        self.state.lock().delays.insert(id, polls);
    }

    pub fn request_count(&self, id: &FileId) -> usize {
        self.state.lock().requests.get(id).copied().unwrap_or(0)
    }
}

impl AnimationSource for MemorySource {
    fn request_clip(&self, id: &FileId, skeleton: &Skeleton) -> ClipRequest {
        let mut state = self.state.lock();
        *state.requests.entry(id.clone()).or_default() += 1;
        if let Some(remaining) = state.delays.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return ClipRequest::Pending;
            }
        }
        let key = (id.clone(), skeleton.name().to_string());
        if let Some(clip) = state.built.get(&key) {
            return ClipRequest::Ready(Arc::clone(clip));
        }
        let Some(raw) = state.raw.get(id).cloned() else {
            return ClipRequest::Missing;
        };
        match AnimationClip::build(raw, skeleton) {
            Ok(clip) => {
                let clip = Arc::new(clip);
                state.built.insert(key, Arc::clone(&clip));
                ClipRequest::Ready(clip)
            }
            Err(_) => ClipRequest::Missing,
        }
    }

    fn skeleton(&self, name: &str) -> Option<Arc<Skeleton>> {
        self.state.lock().skeletons.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_entries_load() {
        for name in skeletons::keys() {
            skeletons::load(&name).expect("skeleton fixture");
        }
        let skeleton = skeletons::load("chain").expect("chain skeleton");
        for name in clips::keys() {
            clips::build(&name, &skeleton).expect("clip fixture");
        }
        for name in node_graphs::keys() {
            node_graphs::spec::<serde_json::Value>(&name).expect("graph fixture");
        }
    }

    #[test]
    fn delayed_clip_reports_pending_first() {
        let source = MemorySource::from_fixtures().expect("fixtures");
        let skeleton = source.skeleton("chain").expect("chain skeleton");
        let id = clips::file_id("idle").expect("idle id");
        source.delay(id.clone(), 2);
        assert!(matches!(source.request_clip(&id, &skeleton), ClipRequest::Pending));
        assert!(matches!(source.request_clip(&id, &skeleton), ClipRequest::Pending));
        assert!(matches!(source.request_clip(&id, &skeleton), ClipRequest::Ready(_)));
        assert_eq!(source.request_count(&id), 3);
        let missing = FileId::new("chain.anim", "nope");
        assert!(matches!(source.request_clip(&missing, &skeleton), ClipRequest::Missing));
    }
}
