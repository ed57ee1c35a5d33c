use super::chunk::ConceptUnit;
use super::enhance::enhance;
use super::store::{ConceptStore, RebuildState};
use crate::eventlog::{EventKind, EventLog};
use crate::search::extract_text;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target"];

/// Outcome of one rebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Chunks dropped because their source file no longer exists.
    pub pruned: usize,
    /// Sources re-read because they were new or their mtime moved.
    pub reindexed: usize,
    pub new_chunks: usize,
    pub merged: usize,
    pub related_links: usize,
    /// Anchors in the index after the pass.
    pub anchors: usize,
    /// The pass stopped early and wrote nothing.
    pub cancelled: bool,
}

impl RebuildReport {
    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn changed(&self) -> bool {
        self.pruned > 0 || self.new_chunks > 0 || self.reindexed > 0
    }
}

struct FileEntry {
    path: String,
    mtime_ms: u64,
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Indexable files under `root`, sorted by path, at most `max_files`.
fn collect_files(root: &Path, extensions: &[String], max_files: usize) -> Vec<FileEntry> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_ext = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }
        let mtime_ms = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        files.push(FileEntry {
            path: entry.path().to_string_lossy().into_owned(),
            mtime_ms,
        });
        if files.len() >= max_files {
            tracing::warn!(max_files, root = %root.display(), "file cap reached; rest of tree skipped");
            break;
        }
    }
    files
}

impl ConceptStore {
    /// Incrementally re-index text files under `root`.
    ///
    /// Chunks of deleted files are pruned, new or modified files are
    /// re-ingested, then the enhancement pass runs over the whole index.
    /// Nothing is written when nothing changed or when `cancel` fires.
    pub async fn rebuild_from_fs(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> anyhow::Result<RebuildReport> {
        let _guard = self.lock_writes().await;
        let root: PathBuf = tokio::fs::canonicalize(root)
            .await
            .with_context(|| format!("resolve {}", root.display()))?;

        let mut index = self.load().await;
        let mut state = self.load_state().await;
        let mut report = RebuildReport::default();

        // Files that vanished since the last pass.
        let gone: Vec<String> = state
            .files
            .keys()
            .filter(|path| !Path::new(path.as_str()).exists())
            .cloned()
            .collect();
        for path in &gone {
            state.files.remove(path);
        }
        report.pruned += index.retain(|chunk| {
            chunk.source != "file" || Path::new(&chunk.path).exists()
        });

        let config = self.config().clone();
        let walk_root = root.clone();
        let files = tokio::task::spawn_blocking(move || {
            collect_files(&walk_root, &config.extensions, config.max_files)
        })
        .await
        .context("file walk panicked")?;

        // Drop stale chunks first. A dropped chunk may have absorbed other
        // files as aliases; those stop answering and are re-read below.
        for file in &files {
            if cancel.is_cancelled() {
                tracing::info!(root = %root.display(), "concept rebuild cancelled");
                return Ok(RebuildReport::cancelled());
            }
            let unchanged = state.files.get(&file.path) == Some(&file.mtime_ms)
                && index.contains_key(&file.path);
            if !unchanged {
                index.remove_key(&file.path);
            }
        }

        for file in files {
            if cancel.is_cancelled() {
                tracing::info!(root = %root.display(), "concept rebuild cancelled");
                return Ok(RebuildReport::cancelled());
            }
            if index.contains_key(&file.path) {
                continue;
            }
            let text = match tokio::fs::read_to_string(&file.path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let mut unit = ConceptUnit::new(file.path.clone(), "file", text);
            unit.timestamp = i64::try_from(file.mtime_ms)
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis);
            if index.ingest(unit, self.config()) {
                report.new_chunks += 1;
            }
            report.reindexed += 1;
            state.files.insert(file.path, file.mtime_ms);
        }

        if cancel.is_cancelled() {
            return Ok(RebuildReport::cancelled());
        }
        if !report.changed() && gone.is_empty() {
            report.anchors = index.anchors.len();
            tracing::debug!(root = %root.display(), "concept index already current");
            return Ok(report);
        }

        let enhanced = enhance(&mut index, self.config(), Utc::now());
        report.merged = enhanced.merged;
        report.related_links = enhanced.related_links;
        report.anchors = index.anchors.len();

        self.commit(&index).await?;
        state.last_run = Some(Utc::now());
        self.save_state(&state).await?;
        tracing::info!(
            root = %root.display(),
            pruned = report.pruned,
            reindexed = report.reindexed,
            merged = report.merged,
            anchors = report.anchors,
            "concept rebuild from files complete"
        );
        Ok(report)
    }

    /// Fold recent events from `logs` into the index. Only events newer
    /// than the rebuild window are considered; already-ingested events are
    /// skipped by key.
    pub async fn rebuild_from_events(
        &self,
        logs: &[Arc<EventLog>],
        now: DateTime<Utc>,
        tool_args_max_chars: usize,
        cancel: &CancellationToken,
    ) -> anyhow::Result<RebuildReport> {
        let cutoff = now - Duration::hours(i64::from(self.config().rebuild_window_hours));
        let mut units = Vec::new();
        for log in logs {
            if cancel.is_cancelled() {
                return Ok(RebuildReport::cancelled());
            }
            let events = log.read_all().await?;
            units.extend(
                events
                    .into_iter()
                    .filter(|e| e.timestamp >= cutoff && e.kind != EventKind::CompactionMarker)
                    .filter_map(|event| {
                        let text = extract_text(&event, tool_args_max_chars)?;
                        let mut unit = ConceptUnit::new(
                            format!("event:{}/{}", event.session_key, event.id),
                            event.kind.as_str(),
                            text,
                        );
                        unit.importance = event.metadata.importance;
                        unit.event_id = Some(event.id);
                        unit.timestamp = Some(event.timestamp);
                        Some(unit)
                    }),
            );
        }
        if cancel.is_cancelled() {
            return Ok(RebuildReport::cancelled());
        }
        self.ingest(units).await
    }

    /// Ingest arbitrary units, enhance, and commit when anything was new.
    pub async fn ingest(&self, units: Vec<ConceptUnit>) -> anyhow::Result<RebuildReport> {
        let _guard = self.lock_writes().await;
        let mut index = self.load().await;
        let mut report = RebuildReport::default();
        for unit in units {
            if index.ingest(unit, self.config()) {
                report.new_chunks += 1;
            }
        }
        report.reindexed = report.new_chunks;
        if report.new_chunks == 0 {
            report.anchors = index.anchors.len();
            return Ok(report);
        }
        let enhanced = enhance(&mut index, self.config(), Utc::now());
        report.merged = enhanced.merged;
        report.related_links = enhanced.related_links;
        report.anchors = index.anchors.len();
        self.commit(&index).await?;
        tracing::info!(
            new_chunks = report.new_chunks,
            merged = report.merged,
            anchors = report.anchors,
            "concept units ingested"
        );
        Ok(report)
    }

    /// Forget the last filesystem pass so the next one re-reads every file.
    pub async fn reset_state(&self) -> anyhow::Result<()> {
        let _guard = self.lock_writes().await;
        self.save_state(&RebuildState::default()).await
    }
}
