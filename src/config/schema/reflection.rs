use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReflectionConfig {
    /// Recall results shorter than this (trimmed) count as misses
    #[serde(default = "default_min_result_chars")]
    pub min_result_chars: usize,
    /// Recall results shorter than this (trimmed) count as false positives
    #[serde(default = "default_useful_result_chars")]
    pub useful_result_chars: usize,
}

fn default_min_result_chars() -> usize {
    20
}
fn default_useful_result_chars() -> usize {
    50
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            min_result_chars: default_min_result_chars(),
            useful_result_chars: default_useful_result_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackgroundConfig {
    /// Background passes allowed to run at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    2
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}
