//! Identifiers for actors and registry slots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host-side actor identity. `ActorId(0)` is reserved as "no actor".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl ActorId {
    pub const NONE: ActorId = ActorId(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

slotmap::new_key_type! {
    /// Registry slot of a live [`Graph`](crate::Graph). Stale once the graph is evicted.
    pub struct GraphKey;
}
