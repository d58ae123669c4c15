//! User configuration.

use serde::{Deserialize, Serialize};

use plait_core::BranchingMode;

/// Default upper bound on `public + masked` payload bytes per message.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Configuration for an [`Author`](crate::Author) or
/// [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Branching mode of channels this user announces. Subscribers take the
    /// mode from the announcement instead.
    pub branching: BranchingMode,
    /// Input to the channel id derivation of announced channels.
    pub channel_index: u64,
    /// Maximum combined public and masked payload size.
    pub max_payload_len: usize,
    /// Upper bound on the passes `sync_state` makes. `None` runs until a pass
    /// finds nothing.
    pub max_passes: Option<usize>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            branching: BranchingMode::SingleBranch,
            channel_index: 0,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            max_passes: None,
        }
    }
}

impl UserConfig {
    pub fn with_branching(mut self, branching: BranchingMode) -> Self {
        self.branching = branching;
        self
    }

    pub fn with_channel_index(mut self, index: u64) -> Self {
        self.channel_index = index;
        self
    }

    pub fn with_max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = Some(passes);
        self
    }
}
