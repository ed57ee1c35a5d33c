//! Compaction reflection: grade evictions by later recall quality or by
//! raw volume, and keep a dated journal of the grades.

pub mod journal;
pub mod retrieval;
pub mod types;
pub mod volume;

pub use journal::{DailyDigest, ReflectionJournal, summarize};
pub use retrieval::{
    CompactionReflector, RECALL_TOOLS, RecallOutcome, RecallStats, classify_result,
    collect_recall_stats, severity_for,
};
pub use types::{
    ActionTaken, CompactionReflection, PreCompactionState, REFLECTION_TAG, ReflectionMode,
    ReflectionRecord, Severity,
};
pub use volume::{reflect_volume, volume_severity};
