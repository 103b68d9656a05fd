//! Binding a [`GraphSpec`] against a skeleton into an evaluable [`PGraph`].

use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, warn};
use procanim_pose_core::{AnimationClip, AnimationSource, ClipRequest, FileId, Skeleton};

use crate::error::BindError;
use crate::schema::{self, NodeKind, NodeSignature};
use crate::types::{CustomValue, EvalType, GraphSpec, NodeSpec, SyncId};

/// Clip referenced by an `anim` node; may still be loading.
#[derive(Debug, Clone)]
pub enum AnimBinding {
    Ready(Arc<AnimationClip>),
    Pending(FileId),
}

/// Custom values resolved once at bind time.
#[derive(Debug, Clone)]
pub enum NodeConfig {
    None,
    Constant(f32),
    IdConstant(u64),
    Anim(AnimBinding),
    SpringBone { bone: usize, parent: Option<usize> },
}

#[derive(Debug, Clone)]
pub struct BoundNode {
    pub sync_id: SyncId,
    pub kind: NodeKind,
    /// Producer slot for each port of the node's signature, in signature order.
    pub inputs: Vec<Option<usize>>,
    pub config: NodeConfig,
}

impl BoundNode {
    pub fn signature(&self) -> &'static NodeSignature {
        self.kind.signature()
    }
}

/// A fully wired node graph bound to one skeleton.
#[derive(Debug, Clone)]
pub struct PGraph {
    nodes: Vec<BoundNode>,
    index: HashMap<SyncId, usize>,
    output: usize,
    skeleton: Arc<Skeleton>,
}

impl PGraph {
    /// Resolve node types, wiring and custom values. Fails as a whole on the
    /// first problem found.
    pub fn bind(
        spec: &GraphSpec,
        skeleton: Arc<Skeleton>,
        source: &dyn AnimationSource,
    ) -> Result<Self, BindError> {
        let mut index = HashMap::with_capacity(spec.nodes.len());
        let mut signatures = Vec::with_capacity(spec.nodes.len());
        for (slot, node) in spec.nodes.iter().enumerate() {
            let sig = schema::lookup(&node.type_name).ok_or_else(|| BindError::UnknownNodeType {
                node: node.sync_id,
                type_name: node.type_name.clone(),
            })?;
            if index.insert(node.sync_id, slot).is_some() {
                return Err(BindError::DuplicateSyncId(node.sync_id));
            }
            signatures.push(sig);
        }
        let output = *index
            .get(&spec.output)
            .ok_or(BindError::MissingOutput(spec.output))?;

        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (node, sig) in spec.nodes.iter().zip(&signatures) {
            let inputs = wire_inputs(node, sig, &index, &signatures)?;
            let config = bind_custom_values(node, sig, &skeleton, source)?;
            nodes.push(BoundNode {
                sync_id: node.sync_id,
                kind: sig.kind,
                inputs,
                config,
            });
        }

        debug!(
            "bound node graph with {} nodes against skeleton '{}'",
            nodes.len(),
            skeleton.name()
        );
        Ok(PGraph {
            nodes,
            index,
            output,
            skeleton,
        })
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn nodes(&self) -> &[BoundNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn slot_of(&self, sync_id: SyncId) -> Option<usize> {
        self.index.get(&sync_id).copied()
    }

    pub fn output_id(&self) -> SyncId {
        self.nodes[self.output].sync_id
    }

    pub fn output_type(&self) -> EvalType {
        self.nodes[self.output].signature().output
    }

    /// Whether any `anim` node is still waiting on its clip.
    pub fn has_pending_clips(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| matches!(n.config, NodeConfig::Anim(AnimBinding::Pending(_))))
    }

    /// Poll the asset source for clips still loading. Clips that turn out to be
    /// missing stay pending and keep producing the rest pose.
    pub fn poll_pending_clips(&mut self, source: &dyn AnimationSource) {
        let skeleton = Arc::clone(&self.skeleton);
        for node in &mut self.nodes {
            if let NodeConfig::Anim(binding) = &mut node.config {
                if let AnimBinding::Pending(id) = binding {
                    match source.request_clip(id, &skeleton) {
                        ClipRequest::Ready(clip) => {
                            debug!("node {}: clip {id} finished loading", node.sync_id);
                            *binding = AnimBinding::Ready(clip);
                        }
                        ClipRequest::Pending => {}
                        ClipRequest::Missing => {
                            warn!("node {}: clip {id} is not available", node.sync_id);
                        }
                    }
                }
            }
        }
    }
}

fn wire_inputs(
    node: &NodeSpec,
    sig: &NodeSignature,
    index: &HashMap<SyncId, usize>,
    signatures: &[&'static NodeSignature],
) -> Result<Vec<Option<usize>>, BindError> {
    if let Some(unknown) = node.inputs.keys().find(|k| sig.input_index(k).is_none()) {
        return Err(BindError::UnknownInput {
            node: node.sync_id,
            input: unknown.clone(),
        });
    }
    let mut wired = Vec::with_capacity(sig.inputs.len());
    for port in sig.inputs {
        let Some(&source_id) = node.inputs.get(port.name) else {
            if port.optional {
                wired.push(None);
                continue;
            }
            return Err(BindError::MissingInput {
                node: node.sync_id,
                input: port.name.to_string(),
            });
        };
        let slot = *index.get(&source_id).ok_or_else(|| BindError::DanglingInput {
            node: node.sync_id,
            input: port.name.to_string(),
            source_id,
        })?;
        let produced = signatures[slot].output;
        if produced != port.ty {
            return Err(BindError::InputTypeMismatch {
                node: node.sync_id,
                input: port.name.to_string(),
                expected: port.ty,
                actual: produced,
            });
        }
        wired.push(Some(slot));
    }
    Ok(wired)
}

fn custom_value<'a>(
    node: &'a NodeSpec,
    name: &'static str,
    expected: EvalType,
) -> Result<&'a CustomValue, BindError> {
    let value = node
        .custom
        .get(name)
        .ok_or_else(|| BindError::MissingCustomValue {
            node: node.sync_id,
            name: name.to_string(),
        })?;
    if value.eval_type() != expected {
        return Err(BindError::BindingTypeMismatch {
            node: node.sync_id,
            name: name.to_string(),
            expected,
            actual: value.eval_type(),
        });
    }
    Ok(value)
}

fn text_value<'a>(node: &'a NodeSpec, name: &'static str) -> Result<&'a str, BindError> {
    match custom_value(node, name, EvalType::Text)? {
        CustomValue::Text(s) => Ok(s),
        other => Err(BindError::BindingTypeMismatch {
            node: node.sync_id,
            name: name.to_string(),
            expected: EvalType::Text,
            actual: other.eval_type(),
        }),
    }
}

fn bind_custom_values(
    node: &NodeSpec,
    sig: &NodeSignature,
    skeleton: &Skeleton,
    source: &dyn AnimationSource,
) -> Result<NodeConfig, BindError> {
    // Type-check everything declared before interpreting any of it.
    for decl in sig.custom_values {
        custom_value(node, decl.name, decl.ty)?;
    }
    let config = match sig.kind {
        NodeKind::Constant => match custom_value(node, "value", EvalType::Float)? {
            CustomValue::Float(v) => NodeConfig::Constant(*v),
            _ => NodeConfig::Constant(0.0),
        },
        NodeKind::IdConstant => match custom_value(node, "value", EvalType::Id)? {
            CustomValue::Id(v) => NodeConfig::IdConstant(*v),
            _ => NodeConfig::IdConstant(0),
        },
        NodeKind::Anim => {
            let id = FileId::new(text_value(node, "file")?, text_value(node, "anim")?);
            match source.request_clip(&id, skeleton) {
                ClipRequest::Ready(clip) => NodeConfig::Anim(AnimBinding::Ready(clip)),
                ClipRequest::Pending => NodeConfig::Anim(AnimBinding::Pending(id)),
                ClipRequest::Missing => {
                    return Err(BindError::UnresolvedCustomValue {
                        node: node.sync_id,
                        name: "anim".to_string(),
                        value: id.to_string(),
                    })
                }
            }
        }
        NodeKind::SpringBone => {
            let name = text_value(node, "bone")?;
            let bone = skeleton
                .bone_index(name)
                .ok_or_else(|| BindError::UnresolvedCustomValue {
                    node: node.sync_id,
                    name: "bone".to_string(),
                    value: name.to_string(),
                })?;
            NodeConfig::SpringBone {
                bone,
                parent: skeleton.parent(bone),
            }
        }
        NodeKind::Add
        | NodeKind::Multiply
        | NodeKind::Oscillator
        | NodeKind::RestPose
        | NodeKind::Blend => NodeConfig::None,
    };
    Ok(config)
}
