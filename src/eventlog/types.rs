use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Tags that carry meaning to the core and are never used as topic hints.
pub const RESERVED_TAGS: &[&str] = &["constraint", "pointer_compaction", "compaction_reflection"];

/// Legacy tag that exempts an event from eviction. New writers should set
/// [`EventMetadata::non_evictable`] instead.
pub const CONSTRAINT_TAG: &str = "constraint";

/// Kind of conversational unit.
///
/// The core recognises its own kinds; anything else a collaborator writes is
/// carried as [`EventKind::Custom`] and indexed by generic text extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    UserMessage,
    AgentMessage,
    ToolCall,
    ToolResult,
    SystemNote,
    CompactionMarker,
    ArtifactReference,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::UserMessage => "user_message",
            Self::AgentMessage => "agent_message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::SystemNote => "system_note",
            Self::CompactionMarker => "compaction_marker",
            Self::ArtifactReference => "artifact_reference",
            Self::Custom(kind) => kind,
        }
    }

    /// Eviction tier, lowest evicted first: bulky tool output goes before
    /// conversation, and artifact references last.
    pub fn eviction_rank(&self) -> u8 {
        match self {
            Self::ToolResult => 0,
            Self::ToolCall => 1,
            Self::ArtifactReference => 3,
            _ => 2,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user_message" => Self::UserMessage,
            "agent_message" => Self::AgentMessage,
            "tool_call" => Self::ToolCall,
            "tool_result" => Self::ToolResult,
            "system_note" => Self::SystemNote,
            "compaction_marker" => Self::CompactionMarker,
            "artifact_reference" => Self::ArtifactReference,
            _ => Self::Custom(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        match value {
            EventKind::Custom(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for EventKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

/// Open metadata map attached to an event. The only part of an event that
/// may change after append, and only through sidecar patches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// 0–10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Exempt from eviction regardless of budget pressure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub non_evictable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub low_priority: bool,
    /// Collaborator-defined fields the core does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Immutable conversational record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// UUIDv7, sortable by creation time.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub turn_id: u64,
    pub session_key: String,
    pub kind: EventKind,
    pub content: String,
    pub tokens: u64,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl Event {
    /// Whether compaction must leave this event in the live cache.
    ///
    /// The `constraint` tag is still honoured for logs written before the
    /// explicit flag existed.
    pub fn is_non_evictable(&self) -> bool {
        self.metadata.non_evictable
            || self.metadata.has_tag(CONSTRAINT_TAG)
            || matches!(self.kind, EventKind::CompactionMarker | EventKind::SystemNote)
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.tool_name.as_deref()
    }
}

/// What a collaborator hands to [`super::EventLog::append`]; the log assigns
/// id, timestamp and session key.
#[derive(Debug, Clone, PartialEq)]
pub struct EventInput {
    pub turn_id: u64,
    pub kind: EventKind,
    pub content: String,
    /// Estimated from content when absent.
    pub tokens: Option<u64>,
    pub metadata: EventMetadata,
}

impl EventInput {
    pub fn new(turn_id: u64, kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            turn_id,
            kind,
            content: content.into(),
            tokens: None,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.tool_name = Some(name.into());
        self
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.metadata.importance = Some(importance.min(10));
        self
    }

    pub fn non_evictable(mut self) -> Self {
        self.metadata.non_evictable = true;
        self
    }
}

/// Append-only metadata update, merged over the frozen event at read time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_evictable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_priority: Option<bool>,
}

impl MetadataPatch {
    pub fn superseded_by(id: impl Into<String>) -> Self {
        Self {
            superseded_by: Some(id.into()),
            low_priority: Some(true),
            ..Self::default()
        }
    }

    pub fn apply(&self, metadata: &mut EventMetadata) {
        for tag in &self.add_tags {
            if !metadata.has_tag(tag) {
                metadata.tags.push(tag.clone());
            }
        }
        if let Some(importance) = self.importance {
            metadata.importance = Some(importance.min(10));
        }
        if let Some(ref id) = self.superseded_by {
            metadata.superseded_by = Some(id.clone());
        }
        if let Some(flag) = self.non_evictable {
            metadata.non_evictable = flag;
        }
        if let Some(flag) = self.low_priority {
            metadata.low_priority = flag;
        }
    }
}
