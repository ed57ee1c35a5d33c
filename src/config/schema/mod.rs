mod compaction;
mod concept;
mod reflection;
mod search;

pub use compaction::CompactionConfig;
pub use concept::{ConceptConfig, EpisodicConfig};
pub use reflection::{BackgroundConfig, ReflectionConfig};
pub use search::{RetrievalConfig, SearchConfig};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration, persisted as `~/.tailmem/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Root for session logs, the search database, concept snapshots and
    /// reflection journals. `~` is expanded on load.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub concept: ConceptConfig,
    #[serde(default)]
    pub episodic: EpisodicConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("~/.tailmem/workspace")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            workspace_dir: default_workspace_dir(),
            compaction: CompactionConfig::default(),
            search: SearchConfig::default(),
            retrieval: RetrievalConfig::default(),
            concept: ConceptConfig::default(),
            episodic: EpisodicConfig::default(),
            reflection: ReflectionConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl Config {
    /// Defaults rooted at an explicit workspace; nothing is read or written.
    pub fn for_workspace(workspace_dir: impl AsRef<Path>) -> Self {
        Self {
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace_dir.join("sessions")
    }

    pub fn search_db_path(&self) -> PathBuf {
        self.workspace_dir.join("search").join("index.db")
    }

    pub fn concept_dir(&self) -> PathBuf {
        self.workspace_dir.join("concept")
    }

    pub fn reflections_dir(&self) -> PathBuf {
        self.workspace_dir.join("reflections")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.compaction;
        if c.headroom_tokens >= c.ctx_tokens {
            return Err(ConfigError::Validation(format!(
                "compaction.headroom_tokens ({}) must be below ctx_tokens ({})",
                c.headroom_tokens, c.ctx_tokens
            )));
        }
        let k = &self.concept;
        if k.anchor_terms == 0 {
            return Err(ConfigError::Validation(
                "concept.anchor_terms must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&k.merge_threshold) || !(0.0..=1.0).contains(&k.related_threshold)
        {
            return Err(ConfigError::Validation(
                "concept similarity thresholds must lie in [0, 1]".into(),
            ));
        }
        if k.related_threshold > k.merge_threshold {
            return Err(ConfigError::Validation(format!(
                "concept.related_threshold ({}) exceeds merge_threshold ({})",
                k.related_threshold, k.merge_threshold
            )));
        }
        if k.default_importance > 10 {
            return Err(ConfigError::Validation(
                "concept.default_importance must be 0-10".into(),
            ));
        }
        if self.background.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "background.max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn headroom_must_fit_inside_budget() {
        let mut config = Config::default();
        config.compaction.headroom_tokens = config.compaction.ctx_tokens;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("headroom_tokens"));
    }

    #[test]
    fn related_band_must_sit_below_merge() {
        let mut config = Config::default();
        config.concept.related_threshold = 0.95;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = Config::default();
        config.background.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
workspace_dir = "/srv/tailmem"

[compaction]
ctx_tokens = 2000
headroom_tokens = 200
"#,
        )
        .unwrap();
        assert_eq!(config.workspace_dir, PathBuf::from("/srv/tailmem"));
        assert_eq!(config.compaction.target_tokens(), 1800);
        assert_eq!(config.compaction.hot_tail_turns, 10);
        assert_eq!(config.concept.extensions, vec!["md", "txt", "rs"]);
        assert_eq!(config.search.default_limit, 20);
    }

    #[test]
    fn workspace_paths_hang_off_root() {
        let config = Config::for_workspace("/w");
        assert_eq!(config.sessions_dir(), PathBuf::from("/w/sessions"));
        assert_eq!(config.search_db_path(), PathBuf::from("/w/search/index.db"));
        assert_eq!(config.concept_dir(), PathBuf::from("/w/concept"));
        assert_eq!(config.reflections_dir(), PathBuf::from("/w/reflections"));
    }
}
