use super::Config;
use std::path::PathBuf;
use tracing::warn;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(workspace) = std::env::var("TAILMEM_WORKSPACE")
            && !workspace.is_empty()
        {
            self.workspace_dir = PathBuf::from(workspace);
        }

        if let Some(ctx) = parse_var::<u64>("TAILMEM_CTX_TOKENS") {
            self.compaction.ctx_tokens = ctx;
        }

        if let Some(headroom) = parse_var::<u64>("TAILMEM_HEADROOM_TOKENS") {
            self.compaction.headroom_tokens = headroom;
        }

        if let Some(turns) = parse_var::<usize>("TAILMEM_HOT_TAIL_TURNS") {
            self.compaction.hot_tail_turns = turns;
        }

        if let Some(full_text) = parse_var::<bool>("TAILMEM_FULL_TEXT") {
            self.search.full_text = full_text;
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
