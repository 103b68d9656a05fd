//! Procedural node graphs: typed nodes wired by sync id, evaluated on demand
//! with per-tick memoization, optionally synchronized across instances.

pub mod error;
pub mod eval;
pub mod graph;
pub mod schema;
pub mod spring;
pub mod types;

pub use error::{BindError, EvalError};
pub use eval::{ClockState, EvalEnv, EvaluationContext, NodeState, SyncSnapshot};
pub use graph::{AnimBinding, BoundNode, NodeConfig, PGraph};
pub use schema::{lookup, registry, CustomSpec, NodeKind, NodeSignature, PortSpec};
pub use spring::{PhysicsConfig, SpringContext, SpringPhysicsJob};
pub use types::*;
