use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    /// Use the FTS5 engine when available; false forces the keyword scan
    #[serde(default = "default_full_text")]
    pub full_text: bool,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Tool-call arguments are truncated to this many chars before indexing
    #[serde(default = "default_tool_args_max_chars")]
    pub tool_args_max_chars: usize,
}

fn default_full_text() -> bool {
    true
}
fn default_limit() -> usize {
    20
}
fn default_tool_args_max_chars() -> usize {
    500
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            full_text: default_full_text(),
            default_limit: default_limit(),
            tool_args_max_chars: default_tool_args_max_chars(),
        }
    }
}

/// Per-turn retrieval of history relevant to an incoming prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Prompts shorter than this (chars) skip retrieval
    #[serde(default = "default_min_prompt_chars")]
    pub min_prompt_chars: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Cap on each retrieved line's text (chars)
    #[serde(default = "default_max_hit_chars")]
    pub max_hit_chars: usize,
    /// Cap on the whole injected block (chars)
    #[serde(default = "default_max_block_chars")]
    pub max_block_chars: usize,
}

fn default_min_prompt_chars() -> usize {
    20
}
fn default_max_keywords() -> usize {
    8
}
fn default_max_results() -> usize {
    5
}
fn default_max_hit_chars() -> usize {
    400
}
fn default_max_block_chars() -> usize {
    2_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_prompt_chars: default_min_prompt_chars(),
            max_keywords: default_max_keywords(),
            max_results: default_max_results(),
            max_hit_chars: default_max_hit_chars(),
            max_block_chars: default_max_block_chars(),
        }
    }
}
