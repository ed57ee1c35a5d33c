use crate::compaction::{CompactionManifest, render_manifest};
use crate::eventlog::{Event, EventKind};
use crate::utils::text::clip;

/// Role recorded for an event kind; searchable via the `roles` filter.
pub fn role_for(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::UserMessage => "user",
        EventKind::AgentMessage | EventKind::ToolCall => "assistant",
        EventKind::ToolResult => "tool",
        _ => "system",
    }
}

/// Flat searchable text for an event, or `None` when there is nothing to
/// index.
pub fn extract_text(event: &Event, tool_args_max_chars: usize) -> Option<String> {
    let content = event.content.trim();
    let text = match event.kind {
        EventKind::ToolCall => {
            let name = event.tool_name().unwrap_or("unknown");
            let args = clip(content, tool_args_max_chars);
            if args.is_empty() {
                format!("[tool:{name}]")
            } else {
                format!("[tool:{name}] {args}")
            }
        }
        EventKind::ToolResult => match event.tool_name() {
            Some(name) if !content.is_empty() => format!("{name}: {content}"),
            _ => content.to_string(),
        },
        EventKind::CompactionMarker => CompactionManifest::parse_lenient(content)
            .filter(|m| !m.is_empty())
            .map_or_else(|| content.to_string(), |m| render_manifest(&m)),
        EventKind::SystemNote => summary_field(content).unwrap_or_else(|| content.to_string()),
        EventKind::ArtifactReference => match event.metadata.artifact_id.as_deref() {
            Some(id) if !content.contains(id) => format!("{id} {content}"),
            _ => content.to_string(),
        },
        _ => content.to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// `summary` (or `diagnosis`) string of a JSON-object note.
fn summary_field(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    ["summary", "diagnosis"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
