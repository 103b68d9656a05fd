//! Contracts with the asset layer.
//!
//! The runtime never touches the filesystem. Hosts implement [`AnimationSource`]
//! and return clips that are already built against the requested skeleton.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clip::AnimationClip;
use crate::skeleton::Skeleton;

/// Composite clip address: source file plus animation id inside it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    pub path: String,
    #[serde(rename = "animId")]
    pub anim_id: String,
}

impl FileId {
    pub fn new(path: impl Into<String>, anim_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            anim_id: anim_id.into(),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.anim_id)
    }
}

/// Result of asking the asset layer for a clip.
#[derive(Clone, Debug)]
pub enum ClipRequest {
    Ready(Arc<AnimationClip>),
    /// Still loading; ask again on a later tick.
    Pending,
    Missing,
}

pub trait AnimationSource: Send + Sync {
    /// Request the clip `id` built for `skeleton`. Must not block.
    fn request_clip(&self, id: &FileId, skeleton: &Skeleton) -> ClipRequest;

    /// Look up a skeleton definition by name.
    fn skeleton(&self, name: &str) -> Option<Arc<Skeleton>>;
}
