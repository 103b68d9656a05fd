//! Registry of built-in node kinds and their port/custom-value signatures.

use serde::Serialize;

use crate::types::EvalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Constant,
    IdConstant,
    Add,
    Multiply,
    Oscillator, // amplitude * sin(2π f t)
    RestPose,
    Anim,
    Blend,
    SpringBone,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortSpec {
    pub name: &'static str,
    pub ty: EvalType,
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomSpec {
    pub name: &'static str,
    pub ty: EvalType,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSignature {
    pub kind: NodeKind,
    pub type_name: &'static str,
    pub inputs: &'static [PortSpec],
    pub custom_values: &'static [CustomSpec],
    pub output: EvalType,
}

impl NodeSignature {
    /// Position of `name` in [`NodeSignature::inputs`].
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }
}

const fn port(name: &'static str, ty: EvalType) -> PortSpec {
    PortSpec {
        name,
        ty,
        optional: false,
    }
}

const fn opt_port(name: &'static str, ty: EvalType) -> PortSpec {
    PortSpec {
        name,
        ty,
        optional: true,
    }
}

const fn custom(name: &'static str, ty: EvalType) -> CustomSpec {
    CustomSpec { name, ty }
}

static REGISTRY: [NodeSignature; 9] = [
    NodeSignature {
        kind: NodeKind::Constant,
        type_name: "constant",
        inputs: &[],
        custom_values: &[custom("value", EvalType::Float)],
        output: EvalType::Float,
    },
    NodeSignature {
        kind: NodeKind::IdConstant,
        type_name: "id_constant",
        inputs: &[],
        custom_values: &[custom("value", EvalType::Id)],
        output: EvalType::Id,
    },
    NodeSignature {
        kind: NodeKind::Add,
        type_name: "add",
        inputs: &[port("a", EvalType::Float), port("b", EvalType::Float)],
        custom_values: &[],
        output: EvalType::Float,
    },
    NodeSignature {
        kind: NodeKind::Multiply,
        type_name: "multiply",
        inputs: &[port("a", EvalType::Float), port("b", EvalType::Float)],
        custom_values: &[],
        output: EvalType::Float,
    },
    NodeSignature {
        kind: NodeKind::Oscillator,
        type_name: "oscillator",
        inputs: &[
            port("frequency", EvalType::Float),
            opt_port("amplitude", EvalType::Float),
        ],
        custom_values: &[],
        output: EvalType::Float,
    },
    NodeSignature {
        kind: NodeKind::RestPose,
        type_name: "rest_pose",
        inputs: &[],
        custom_values: &[],
        output: EvalType::Pose,
    },
    NodeSignature {
        kind: NodeKind::Anim,
        type_name: "anim",
        inputs: &[opt_port("speed", EvalType::Float)],
        custom_values: &[custom("file", EvalType::Text), custom("anim", EvalType::Text)],
        output: EvalType::Pose,
    },
    NodeSignature {
        kind: NodeKind::Blend,
        type_name: "blend",
        inputs: &[
            port("a", EvalType::Pose),
            port("b", EvalType::Pose),
            port("weight", EvalType::Float),
        ],
        custom_values: &[],
        output: EvalType::Pose,
    },
    NodeSignature {
        kind: NodeKind::SpringBone,
        type_name: "spring_bone",
        inputs: &[
            port("pose", EvalType::Pose),
            port("stiffness", EvalType::Float),
            port("damping", EvalType::Float),
            port("mass", EvalType::Float),
            opt_port("gravity_x", EvalType::Float),
            opt_port("gravity_y", EvalType::Float),
            opt_port("gravity_z", EvalType::Float),
        ],
        custom_values: &[custom("bone", EvalType::Text)],
        output: EvalType::Pose,
    },
];

/// Every node kind known to the evaluator.
pub fn registry() -> &'static [NodeSignature] {
    &REGISTRY
}

/// Look up a signature by its serialized type name.
pub fn lookup(type_name: &str) -> Option<&'static NodeSignature> {
    REGISTRY.iter().find(|sig| sig.type_name == type_name)
}

impl NodeKind {
    pub fn signature(self) -> &'static NodeSignature {
        // REGISTRY holds exactly one entry per kind.
        REGISTRY
            .iter()
            .find(|sig| sig.kind == self)
            .unwrap_or(&REGISTRY[0])
    }
}
