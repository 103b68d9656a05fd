//! procanim animation core (engine-agnostic)
//!
//! Per-actor animation state for the procanim runtime. Each actor owns a
//! [`Graph`] holding its active [`Generator`], an optional [`Transition`]
//! between generators and an optional [`Sequencer`] of phases. Actors may be
//! synchronized so followers share an owner's root transform and timing.
//!
//! The [`GraphManager`] is the entry point for hosts: it creates graphs on
//! demand, ticks them, and evicts those that no longer animate anything.

pub mod config;
pub mod error;
pub mod generator;
pub mod graph;
pub mod host;
pub mod ids;
pub mod manager;
pub mod sequencer;
pub mod sync;
pub mod transition;

pub use config::Config;
pub use error::AnimError;
pub use generator::{GenerateContext, Generator, GeneratorDesc, GraphGenerator, LinearClipGenerator};
pub use graph::{Graph, GraphFlags, UpdateEnv};
pub use host::{ActorResolver, PoseConsumer};
pub use ids::{ActorId, GraphKey};
pub use manager::{GraphHandle, GraphManager};
pub use sequencer::{PhaseData, Sequencer, SequencerFlags};
pub use sync::{SyncData, SyncInstance, SyncPoint, SyncRole, SyncRoleKind};
pub use transition::Transition;

pub use procanim_graph_core as graph_core;
pub use procanim_pose_core as pose_core;
