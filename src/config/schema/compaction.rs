use serde::{Deserialize, Serialize};

/// Token budgets for pointer compaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompactionConfig {
    /// Total context budget in estimated tokens
    #[serde(default = "default_ctx_tokens")]
    pub ctx_tokens: u64,
    /// Tokens kept free below the budget for the next turn
    #[serde(default = "default_headroom_tokens")]
    pub headroom_tokens: u64,
    /// Most recent turns that are never evicted
    #[serde(default = "default_hot_tail_turns")]
    pub hot_tail_turns: usize,
    /// Markers kept visible in the live cache; older ones drop from view
    #[serde(default = "default_marker_soft_cap")]
    pub marker_soft_cap: usize,
}

fn default_ctx_tokens() -> u64 {
    100_000
}
fn default_headroom_tokens() -> u64 {
    4_000
}
fn default_hot_tail_turns() -> usize {
    10
}
fn default_marker_soft_cap() -> usize {
    20
}

impl CompactionConfig {
    /// Budget the cache events must fit into after a cycle.
    pub fn target_tokens(&self) -> u64 {
        self.ctx_tokens.saturating_sub(self.headroom_tokens)
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            ctx_tokens: default_ctx_tokens(),
            headroom_tokens: default_headroom_tokens(),
            hot_tail_turns: default_hot_tail_turns(),
            marker_soft_cap: default_marker_soft_cap(),
        }
    }
}
