//! Ordered, advanceable list of animation phases.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::generator::GeneratorDesc;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseData {
    pub generator: GeneratorDesc,
    /// Blend time into this phase when advancing smoothly.
    #[serde(default)]
    pub transition_time: f32,
    /// Advance automatically after this many completed loops.
    /// `None` holds the phase until an explicit advance.
    #[serde(default)]
    pub loops: Option<u32>,
}

impl PhaseData {
    pub fn new(generator: GeneratorDesc, transition_time: f32) -> Self {
        Self {
            generator,
            transition_time,
            loops: None,
        }
    }

    pub fn with_loops(mut self, loops: u32) -> Self {
        self.loops = Some(loops);
        self
    }
}

bitflags! {
    /// Advance requests, observed and cleared on the next tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SequencerFlags: u8 {
        /// Move to the next phase regardless of completion.
        const FORCE_ADVANCE = 0b0000_0001;
        /// Blend into the next phase instead of cutting.
        const SMOOTH_ADVANCE = 0b0000_0010;
    }
}

#[derive(Debug)]
pub struct Sequencer {
    phases: Vec<PhaseData>,
    current: usize,
    flags: SequencerFlags,
}

impl Sequencer {
    /// `None` for an empty phase list.
    pub fn new(phases: Vec<PhaseData>) -> Option<Self> {
        if phases.is_empty() {
            return None;
        }
        Some(Self {
            phases,
            current: 0,
            flags: SequencerFlags::empty(),
        })
    }

    pub fn phases(&self) -> &[PhaseData] {
        &self.phases
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_phase(&self) -> &PhaseData {
        &self.phases[self.current]
    }

    pub fn flags(&self) -> SequencerFlags {
        self.flags
    }

    pub fn request_advance(&mut self, smooth: bool) {
        self.flags.insert(SequencerFlags::FORCE_ADVANCE);
        if smooth {
            self.flags.insert(SequencerFlags::SMOOTH_ADVANCE);
        }
    }

    /// Take a pending advance request, returning whether it asked for a smooth advance.
    pub(crate) fn take_advance_request(&mut self) -> Option<bool> {
        if !self.flags.contains(SequencerFlags::FORCE_ADVANCE) {
            return None;
        }
        let smooth = self.flags.contains(SequencerFlags::SMOOTH_ADVANCE);
        self.flags = SequencerFlags::empty();
        Some(smooth)
    }

    /// Step to the next phase. `None` once the sequence is exhausted.
    pub(crate) fn step(&mut self) -> Option<&PhaseData> {
        if self.current + 1 >= self.phases.len() {
            return None;
        }
        self.current += 1;
        self.phases.get(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procanim_pose_core::FileId;

    fn phases(n: usize) -> Vec<PhaseData> {
        (0..n)
            .map(|i| PhaseData::new(GeneratorDesc::clip(FileId::new("a.anim", format!("p{i}"))), 0.1))
            .collect()
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(Sequencer::new(Vec::new()).is_none());
    }

    #[test]
    fn advance_flags_are_consumed_once() {
        let mut seq = Sequencer::new(phases(2)).expect("non-empty");
        assert_eq!(seq.take_advance_request(), None);
        seq.request_advance(true);
        seq.request_advance(false);
        assert!(seq.flags().contains(SequencerFlags::SMOOTH_ADVANCE));
        assert_eq!(seq.take_advance_request(), Some(true));
        assert_eq!(seq.take_advance_request(), None);
    }

    #[test]
    fn stepping_past_last_phase_exhausts() {
        let mut seq = Sequencer::new(phases(2)).expect("non-empty");
        assert!(seq.step().is_some());
        assert_eq!(seq.current_index(), 1);
        assert!(seq.step().is_none());
    }
}
