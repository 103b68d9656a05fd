//! Runtime configuration for the animation core.

use procanim_graph_core::PhysicsConfig;
use serde::{Deserialize, Serialize};

/// Pool sizing, physics limits and registry policy.
/// Every field has a default, so partial JSON is accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial number of pose buffers.
    pub pose_pool_capacity: usize,
    /// Allow the pose pool to allocate past its initial capacity.
    pub pose_pool_growth: bool,

    /// Longest delta (seconds) the spring integrator will consume in one tick.
    pub max_physics_delta: f32,
    /// Longest integration sub-step (seconds).
    pub physics_substep: f32,

    /// Seconds of phase correction a follower may apply per second of tick time.
    pub sync_correction_rate: f32,

    /// Drop graphs that hold no animation state after each tick.
    pub evict_idle_graphs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pose_pool_capacity: 64,
            pose_pool_growth: true,
            max_physics_delta: 0.05,
            physics_substep: 1.0 / 60.0,
            sync_correction_rate: 0.5,
            evict_idle_graphs: true,
        }
    }
}

impl Config {
    pub fn physics(&self) -> PhysicsConfig {
        PhysicsConfig {
            max_delta: self.max_physics_delta,
            max_substep: self.physics_substep,
        }
    }

    /// Largest follower correction allowed for a tick of `dt` seconds.
    pub fn max_sync_correction(&self, dt: f32) -> f32 {
        (self.sync_correction_rate * dt).max(0.0)
    }
}
