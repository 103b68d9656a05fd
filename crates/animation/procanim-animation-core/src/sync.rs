//! State shared between a synchronization owner and its followers.
//!
//! The owner publishes its root transform and generator timing into a
//! [`SyncInstance`] every tick; followers read it during their own tick.
//! The sync mutex is a leaf lock: it is only ever taken while holding at most
//! one graph lock, and never held while acquiring a graph lock.

use std::sync::Arc;

use nalgebra::Matrix4;
use parking_lot::Mutex;
use procanim_graph_core::{ClockState, SyncSnapshot};

use crate::ids::ActorId;

/// Timing published by a generator for followers to align with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncPoint {
    pub generator_time: Option<f32>,
    /// Wrap-around period of `generator_time` for looping generators.
    pub period: Option<f32>,
    /// Node clocks of graph-backed generators.
    pub graph: Option<SyncSnapshot>,
}

impl SyncPoint {
    /// Move `time` toward the published generator time by at most `max_correction`.
    pub fn correct_time(&self, time: f32, period: Option<f32>, max_correction: f32) -> f32 {
        let Some(target) = self.generator_time else {
            return time;
        };
        let mut clock = ClockState {
            time,
            rate: 1.0,
            period: period.or(self.period),
        };
        clock.correct_toward(target, max_correction);
        clock.time
    }
}

#[derive(Debug)]
pub struct SyncData {
    pub owner: ActorId,
    pub followers: Vec<ActorId>,
    pub root_transform: Matrix4<f32>,
    pub point: SyncPoint,
    /// Cleared when the owner stops syncing or goes away.
    pub active: bool,
}

pub type SyncInstance = Arc<Mutex<SyncData>>;

pub(crate) fn new_instance(owner: ActorId, root_transform: Matrix4<f32>) -> SyncInstance {
    Arc::new(Mutex::new(SyncData {
        owner,
        followers: Vec::new(),
        root_transform,
        point: SyncPoint::default(),
        active: true,
    }))
}

/// Synchronization role of a graph.
#[derive(Clone, Debug, Default)]
pub enum SyncRole {
    #[default]
    None,
    Owner(SyncInstance),
    Follower(SyncInstance),
}

/// Role without the shared payload, for inspection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncRoleKind {
    None,
    Owner,
    Follower,
}

impl SyncRole {
    pub fn kind(&self) -> SyncRoleKind {
        match self {
            SyncRole::None => SyncRoleKind::None,
            SyncRole::Owner(_) => SyncRoleKind::Owner,
            SyncRole::Follower(_) => SyncRoleKind::Follower,
        }
    }

    pub fn instance(&self) -> Option<&SyncInstance> {
        match self {
            SyncRole::None => None,
            SyncRole::Owner(inst) | SyncRole::Follower(inst) => Some(inst),
        }
    }
}
