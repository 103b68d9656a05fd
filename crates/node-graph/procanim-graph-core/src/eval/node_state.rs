//! Mutable per-instance node state that persists across ticks.

use crate::schema::NodeKind;
use crate::spring::SpringContext;

/// Local clock for time-driven nodes (oscillators, clip players).
#[derive(Clone, Debug, PartialEq)]
pub struct ClockState {
    pub time: f32,
    /// Playback rate applied by the next `advance`; refreshed on evaluation.
    pub rate: f32,
    /// Wrap-around period once known, e.g. the clip duration.
    pub period: Option<f32>,
}

impl Default for ClockState {
    fn default() -> Self {
        ClockState {
            time: 0.0,
            rate: 1.0,
            period: None,
        }
    }
}

impl ClockState {
    pub fn advance(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.time += dt * self.rate;
        self.wrap();
    }

    pub fn wrap(&mut self) {
        if let Some(period) = self.period.filter(|p| *p > 0.0) {
            self.time = self.time.rem_euclid(period);
        }
    }

    /// Move toward `target` by at most `max_delta`, taking the short way
    /// around when the clock wraps.
    pub fn correct_toward(&mut self, target: f32, max_delta: f32) {
        let mut diff = target - self.time;
        if let Some(period) = self.period.filter(|p| *p > 0.0) {
            diff = (diff + period * 0.5).rem_euclid(period) - period * 0.5;
        }
        let max_delta = max_delta.max(0.0);
        self.time += diff.clamp(-max_delta, max_delta);
        self.wrap();
    }
}

/// State stored for each node instance.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum NodeState {
    #[default]
    Stateless,
    Clock(ClockState),
    Spring(SpringContext),
}

impl NodeState {
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Oscillator | NodeKind::Anim => NodeState::Clock(ClockState::default()),
            NodeKind::SpringBone => NodeState::Spring(SpringContext::default()),
            _ => NodeState::Stateless,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        match self {
            NodeState::Stateless => {}
            NodeState::Clock(clock) => clock.advance(dt),
            NodeState::Spring(ctx) => ctx.advance(dt),
        }
    }

    /// Fetch the clock, reinitialising the slot if it held another state.
    pub fn clock_mut(&mut self) -> &mut ClockState {
        match self {
            NodeState::Clock(clock) => clock,
            slot => {
                *slot = NodeState::Clock(ClockState::default());
                slot.clock_mut()
            }
        }
    }

    /// Fetch the spring context, reinitialising the slot if it held another state.
    pub fn spring_mut(&mut self) -> &mut SpringContext {
        match self {
            NodeState::Spring(ctx) => ctx,
            slot => {
                *slot = NodeState::Spring(SpringContext::default());
                slot.spring_mut()
            }
        }
    }

    pub fn as_clock(&self) -> Option<&ClockState> {
        match self {
            NodeState::Clock(clock) => Some(clock),
            _ => None,
        }
    }
}
