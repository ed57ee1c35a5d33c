use std::path::PathBuf;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `tailmem`.
///
/// The event log and the compactor surface typed errors because their faults
/// must reach the caller of `append`/`compact`. The derived indexes use
/// `anyhow::Result` internally and degrade instead of failing.
#[derive(Debug, Error)]
pub enum TailmemError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Event log ───────────────────────────────────────────────────────
    #[error("event log: {0}")]
    Log(#[from] EventLogError),

    // ── Compaction ──────────────────────────────────────────────────────
    #[error("compaction: {0}")]
    Compaction(#[from] CompactionError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Event log errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("io on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EventLogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ─── Compaction errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("event {event_id} is not persisted in the log; refusing to evict it")]
    NotPersisted { event_id: String },

    #[error(transparent)]
    Log(#[from] EventLogError),
}

pub type Result<T> = std::result::Result<T, TailmemError>;
