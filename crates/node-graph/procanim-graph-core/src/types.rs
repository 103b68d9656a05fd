//! Serialized graph description and the values that flow along its edges.

use std::fmt;

use hashbrown::HashMap;
use procanim_pose_core::PoseHandle;
use serde::{Deserialize, Serialize};

/// Stable node identifier. Doubles as the per-tick memo key and as the
/// correspondence key between synchronized graph instances.
pub type SyncId = u64;

/// Discriminant of [`EvalResult`], used for port and custom-value declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalType {
    Float,
    Pose,
    Id,
    Text,
}

impl fmt::Display for EvalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvalType::Float => "float",
            EvalType::Pose => "pose",
            EvalType::Id => "id",
            EvalType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Value produced by a node. Pose results own a pooled buffer, so results are
/// moved or borrowed, never copied.
#[derive(Debug)]
pub enum EvalResult {
    Float(f32),
    Pose(PoseHandle),
    Id(u64),
    Text(String),
}

impl EvalResult {
    pub fn eval_type(&self) -> EvalType {
        match self {
            EvalResult::Float(_) => EvalType::Float,
            EvalResult::Pose(_) => EvalType::Pose,
            EvalResult::Id(_) => EvalType::Id,
            EvalResult::Text(_) => EvalType::Text,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            EvalResult::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pose(&self) -> Option<&PoseHandle> {
        match self {
            EvalResult::Pose(h) => Some(h),
            _ => None,
        }
    }

    pub fn into_pose(self) -> Option<PoseHandle> {
        match self {
            EvalResult::Pose(h) => Some(h),
            _ => None,
        }
    }
}

/// Bind-time configuration value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomValue {
    Float(f32),
    Id(u64),
    Text(String),
}

impl CustomValue {
    pub fn eval_type(&self) -> EvalType {
        match self {
            CustomValue::Float(_) => EvalType::Float,
            CustomValue::Id(_) => EvalType::Id,
            CustomValue::Text(_) => EvalType::Text,
        }
    }
}

impl fmt::Display for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomValue::Float(v) => write!(f, "{v}"),
            CustomValue::Id(v) => write!(f, "#{v}"),
            CustomValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "syncId")]
    pub sync_id: SyncId,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Input port name to the sync id of the producing node.
    #[serde(default)]
    pub inputs: HashMap<String, SyncId>,
    #[serde(default)]
    pub custom: HashMap<String, CustomValue>,
}

impl NodeSpec {
    pub fn new(sync_id: SyncId, type_name: impl Into<String>) -> Self {
        NodeSpec {
            sync_id,
            type_name: type_name.into(),
            inputs: HashMap::new(),
            custom: HashMap::new(),
        }
    }

    pub fn with_input(mut self, port: &str, source: SyncId) -> Self {
        self.inputs.insert(port.to_string(), source);
        self
    }

    pub fn with_custom(mut self, name: &str, value: CustomValue) -> Self {
        self.custom.insert(name.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<NodeSpec>,
    /// Node whose result the graph produces.
    pub output: SyncId,
}
