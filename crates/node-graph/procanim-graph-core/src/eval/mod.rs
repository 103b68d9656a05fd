//! Demand-driven evaluation of a bound [`PGraph`].
//!
//! Requesting a node checks the tick-scoped memo first; on a miss its inputs
//! are requested recursively, then the node itself runs and its result is
//! cached. Diamonds therefore evaluate shared nodes once per tick and no
//! topological sort is needed. A node requested while it is still being
//! evaluated means the graph has a cycle, reported as
//! [`EvalError::CycleDetected`].
//!
//! - [`node_state`] holds per-instance state (clocks, spring contexts).
//! - [`eval_node`] dispatches on [`NodeKind`](crate::NodeKind).

use hashbrown::{HashMap, HashSet};

use crate::error::EvalError;
use crate::graph::PGraph;
use crate::types::{EvalResult, SyncId};

mod eval_node;
pub mod node_state;

pub use eval_node::EvalEnv;
pub use node_state::{ClockState, NodeState};


/// Largest input count of any registered node kind.
const MAX_INPUTS: usize = 8;

/// Clock positions published by a synchronization owner, keyed by sync id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncSnapshot {
    clocks: HashMap<SyncId, f32>,
}

impl SyncSnapshot {
    pub fn clock(&self, sync_id: SyncId) -> Option<f32> {
        self.clocks.get(&sync_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

/// Scratch and persistent state for one instance of a [`PGraph`].
#[derive(Debug, Default)]
pub struct EvaluationContext {
    states: Vec<NodeState>,
    memo: HashMap<SyncId, EvalResult>,
    in_progress: HashSet<SyncId>,
    evaluations: Vec<u32>,
}

impl EvaluationContext {
    pub fn new(graph: &PGraph) -> Self {
        let mut ctx = EvaluationContext::default();
        ctx.ensure_layout(graph);
        ctx
    }

    fn ensure_layout(&mut self, graph: &PGraph) {
        if self.states.len() != graph.node_count() {
            self.states = graph
                .nodes()
                .iter()
                .map(|n| NodeState::for_kind(n.kind))
                .collect();
            self.evaluations = vec![0; graph.node_count()];
            self.memo.clear();
        }
    }

    pub fn node_state(&self, graph: &PGraph, sync_id: SyncId) -> Option<&NodeState> {
        graph.slot_of(sync_id).and_then(|slot| self.states.get(slot))
    }

    /// Age every stateful node by `dt`. Call once per tick before requesting output.
    pub fn advance_time(&mut self, graph: &PGraph, dt: f32) {
        self.ensure_layout(graph);
        for state in &mut self.states {
            state.advance(dt);
        }
    }

    /// Start a new tick: drop memoized results (returning their pose buffers)
    /// and reset the per-node evaluation counters.
    pub fn begin_tick(&mut self) {
        self.memo.clear();
        self.in_progress.clear();
        self.evaluations.iter_mut().for_each(|c| *c = 0);
    }

    /// How many times `sync_id` ran since the last [`begin_tick`](Self::begin_tick).
    pub fn evaluation_count(&self, graph: &PGraph, sync_id: SyncId) -> u32 {
        graph
            .slot_of(sync_id)
            .and_then(|slot| self.evaluations.get(slot).copied())
            .unwrap_or(0)
    }

    /// Result of `sync_id` for the current tick, evaluating it on demand.
    pub fn request<'c>(
        &'c mut self,
        graph: &PGraph,
        env: &EvalEnv<'_>,
        sync_id: SyncId,
    ) -> Result<&'c EvalResult, EvalError> {
        self.ensure_layout(graph);
        let slot = graph
            .slot_of(sync_id)
            .ok_or(EvalError::UnknownNode { sync_id })?;
        self.resolve(graph, env, slot)?;
        self.memo
            .get(&sync_id)
            .ok_or(EvalError::UnknownNode { sync_id })
    }

    /// Run a full tick for the graph's output node and hand its result to the
    /// caller. Every other result produced during the tick is released.
    pub fn evaluate_output(
        &mut self,
        graph: &PGraph,
        env: &EvalEnv<'_>,
    ) -> Result<EvalResult, EvalError> {
        self.ensure_layout(graph);
        self.begin_tick();
        let sync_id = graph.output_id();
        let result = match graph.slot_of(sync_id) {
            Some(slot) => self.resolve(graph, env, slot).and_then(|_| {
                self.memo
                    .remove(&sync_id)
                    .ok_or(EvalError::UnknownNode { sync_id })
            }),
            None => Err(EvalError::UnknownNode { sync_id }),
        };
        self.memo.clear();
        result
    }

    fn resolve(&mut self, graph: &PGraph, env: &EvalEnv<'_>, slot: usize) -> Result<(), EvalError> {
        let sync_id = graph.nodes()[slot].sync_id;
        if self.memo.contains_key(&sync_id) {
            return Ok(());
        }
        if !self.in_progress.insert(sync_id) {
            return Err(EvalError::CycleDetected { sync_id });
        }
        let result = self.compute(graph, env, slot);
        self.in_progress.remove(&sync_id);
        self.memo.insert(sync_id, result?);
        Ok(())
    }

    fn compute(
        &mut self,
        graph: &PGraph,
        env: &EvalEnv<'_>,
        slot: usize,
    ) -> Result<EvalResult, EvalError> {
        let nodes = graph.nodes();
        let node = &nodes[slot];
        for source in node.inputs.iter().flatten() {
            self.resolve(graph, env, *source)?;
        }

        let memo = &self.memo;
        let mut inputs: [Option<&EvalResult>; MAX_INPUTS] = [None; MAX_INPUTS];
        for (dst, source) in inputs.iter_mut().zip(&node.inputs) {
            *dst = source.and_then(|s| memo.get(&nodes[s].sync_id));
        }
        self.evaluations[slot] += 1;
        eval_node::eval_node(
            node,
            &inputs[..node.inputs.len().min(MAX_INPUTS)],
            &mut self.states[slot],
            graph.skeleton(),
            env,
        )
    }

    /// Publish this instance's clocks for followers.
    pub fn snapshot(&self, graph: &PGraph) -> SyncSnapshot {
        let clocks = graph
            .nodes()
            .iter()
            .zip(&self.states)
            .filter_map(|(node, state)| state.as_clock().map(|c| (node.sync_id, c.time)))
            .collect();
        SyncSnapshot { clocks }
    }

    /// Pull each clock toward the owner's matching node by at most
    /// `max_correction` seconds. Returns how many nodes found a counterpart.
    pub fn synchronize(&mut self, graph: &PGraph, owner: &SyncSnapshot, max_correction: f32) -> usize {
        self.ensure_layout(graph);
        let mut matched = 0;
        for (node, state) in graph.nodes().iter().zip(&mut self.states) {
            let NodeState::Clock(clock) = state else {
                continue;
            };
            if let Some(target) = owner.clock(node.sync_id) {
                clock.correct_toward(target, max_correction);
                matched += 1;
            }
        }
        matched
    }
}
