use super::types::{Event, EventInput, EventKind, MetadataPatch};
use crate::error::EventLogError;
use crate::utils::text::estimate_tokens;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

type LogResult<T> = std::result::Result<T, EventLogError>;

/// Events read from a byte offset, plus the offset just past the last
/// complete line.
#[derive(Debug, Clone, Default)]
pub struct LogSlice {
    pub events: Vec<Event>,
    /// Where reading actually began; differs from the requested offset only
    /// when the log turned out shorter than it.
    pub start_offset: u64,
    pub next_offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatchRecord {
    event_id: String,
    patch: MetadataPatch,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct WriterState {
    log_tail_clean: bool,
    sidecar_tail_clean: bool,
}

/// Append-only JSONL log for one session.
///
/// Appends serialize on an internal lock, so share one instance per session
/// (see [`EventLogRegistry`]). Reads only consider newline-terminated lines
/// and never block writers.
#[derive(Debug)]
pub struct EventLog {
    session_key: String,
    path: PathBuf,
    sidecar_path: PathBuf,
    writer: Mutex<WriterState>,
}

/// File stem for a session key.
///
/// `[A-Za-z0-9-]` pass through; every other byte, `_` included, becomes
/// `_XX` (uppercase hex). The mapping is injective, so distinct keys never
/// share a file, and [`session_key_from_stem`] reverses it.
pub fn sanitize_session_key(key: &str) -> String {
    if key.is_empty() {
        return "_".into();
    }
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{byte:02X}"));
        }
    }
    stem
}

/// Inverse of [`sanitize_session_key`]; `None` for stems it never produces.
pub fn session_key_from_stem(stem: &str) -> Option<String> {
    if stem == "_" {
        return Some(String::new());
    }
    let raw = stem.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'_' => {
                let hex = stem.get(i + 1..i + 3)?;
                let byte = u8::from_str_radix(hex, 16).ok()?;
                let canonical = !(byte.is_ascii_alphanumeric() || byte == b'-')
                    && !hex.bytes().any(|b| b.is_ascii_lowercase());
                if !canonical {
                    return None;
                }
                bytes.push(byte);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'-' => {
                bytes.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(bytes).ok()
}

impl EventLog {
    pub fn open(dir: impl AsRef<Path>, session_key: impl Into<String>) -> Self {
        let session_key = session_key.into();
        let stem = sanitize_session_key(&session_key);
        let dir = dir.as_ref();
        Self {
            path: dir.join(format!("{stem}.jsonl")),
            sidecar_path: dir.join(format!("{stem}.meta.jsonl")),
            session_key,
            writer: Mutex::new(WriterState::default()),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assign id, timestamp and token estimate, then durably append.
    ///
    /// Returns only once the record is synced; any I/O fault is returned and
    /// the event must be treated as not existing.
    pub async fn append(&self, input: EventInput) -> LogResult<Event> {
        let tokens = input
            .tokens
            .unwrap_or_else(|| estimate_tokens(&input.content));
        let mut state = self.writer.lock().await;
        let event = Event {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            turn_id: input.turn_id,
            session_key: self.session_key.clone(),
            kind: input.kind,
            content: input.content,
            tokens,
            metadata: input.metadata,
        };
        let line = encode_line(&event)?;
        append_line(&self.path, &line, &mut state.log_tail_clean).await?;
        debug!(
            session = %self.session_key,
            id = %event.id,
            kind = %event.kind,
            tokens = event.tokens,
            "appended event"
        );
        Ok(event)
    }

    /// Append a fully formed event as-is (replay/import).
    pub async fn append_raw(&self, event: &Event) -> LogResult<()> {
        let line = encode_line(event)?;
        let mut state = self.writer.lock().await;
        append_line(&self.path, &line, &mut state.log_tail_clean).await
    }

    /// All events in append order with metadata patches merged.
    pub async fn read_all(&self) -> LogResult<Vec<Event>> {
        let mut events = self.read_raw().await?;
        let patches = self.read_patches().await?;
        if !patches.is_empty() {
            for event in &mut events {
                if let Some(list) = patches.get(&event.id) {
                    for patch in list {
                        patch.apply(&mut event.metadata);
                    }
                }
            }
        }
        Ok(events)
    }

    pub async fn read_by_kind(&self, kind: &EventKind) -> LogResult<Vec<Event>> {
        let mut events = self.read_all().await?;
        events.retain(|e| &e.kind == kind);
        Ok(events)
    }

    /// Events whose turn id lies in `turn_start..=turn_end`.
    pub async fn read_range(&self, turn_start: u64, turn_end: u64) -> LogResult<Vec<Event>> {
        let mut events = self.read_all().await?;
        events.retain(|e| e.turn_id >= turn_start && e.turn_id <= turn_end);
        Ok(events)
    }

    pub async fn read_by_id(&self, id: &str) -> LogResult<Option<Event>> {
        Ok(self.read_all().await?.into_iter().find(|e| e.id == id))
    }

    pub async fn count(&self) -> LogResult<usize> {
        Ok(self.read_raw().await?.len())
    }

    /// Raw events (no metadata patches) from `offset` onwards.
    ///
    /// An offset past the end of the file means the log was replaced; the
    /// read restarts from the beginning.
    pub async fn read_since(&self, offset: u64) -> LogResult<LogSlice> {
        let (bytes, start) = read_from(&self.path, offset).await?;
        let (events, consumed) = parse_lines::<Event>(&self.path, &bytes, start);
        Ok(LogSlice {
            events,
            start_offset: start,
            next_offset: start + consumed as u64,
        })
    }

    /// Record a metadata patch for `id`. Returns false if no such event exists.
    pub async fn update_metadata(&self, id: &str, patch: MetadataPatch) -> LogResult<bool> {
        if !self.read_raw().await?.iter().any(|e| e.id == id) {
            return Ok(false);
        }
        let record = PatchRecord {
            event_id: id.to_string(),
            patch,
            at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut state = self.writer.lock().await;
        append_line(&self.sidecar_path, &line, &mut state.sidecar_tail_clean).await?;
        Ok(true)
    }

    async fn read_raw(&self) -> LogResult<Vec<Event>> {
        let (bytes, start) = read_from(&self.path, 0).await?;
        Ok(parse_lines::<Event>(&self.path, &bytes, start).0)
    }

    async fn read_patches(&self) -> LogResult<HashMap<String, Vec<MetadataPatch>>> {
        let (bytes, start) = read_from(&self.sidecar_path, 0).await?;
        let mut map: HashMap<String, Vec<MetadataPatch>> = HashMap::new();
        for record in parse_lines::<PatchRecord>(&self.sidecar_path, &bytes, start).0 {
            map.entry(record.event_id).or_default().push(record.patch);
        }
        Ok(map)
    }
}

fn encode_line(event: &Event) -> LogResult<Vec<u8>> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

async fn append_line(path: &Path, line: &[u8], tail_clean: &mut bool) -> LogResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| EventLogError::io(parent, e))?;
    }
    let result = async {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .await?;
        let mut buf = Vec::with_capacity(line.len() + 1);
        if !*tail_clean && !ends_with_newline(&mut file).await? {
            warn!(path = %path.display(), "terminating torn record at end of log");
            buf.push(b'\n');
        }
        buf.extend_from_slice(line);
        file.write_all(&buf).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    match result {
        Ok(()) => {
            *tail_clean = true;
            Ok(())
        }
        Err(e) => {
            *tail_clean = false;
            Err(EventLogError::io(path, e))
        }
    }
}

async fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn read_from(path: &Path, offset: u64) -> LogResult<(Vec<u8>, u64)> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(EventLogError::io(path, e)),
    };
    let io = |e: std::io::Error| EventLogError::io(path, e);
    let len = file.metadata().await.map_err(io)?.len();
    let start = if offset > len {
        warn!(
            path = %path.display(),
            offset,
            len,
            "offset beyond end of log; reading from the start"
        );
        0
    } else {
        offset
    };
    file.seek(SeekFrom::Start(start)).await.map_err(io)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await.map_err(io)?;
    Ok((buf, start))
}

/// Parse complete lines, skipping malformed ones. Returns the records and the
/// number of bytes consumed (up to and including the last newline).
fn parse_lines<T: DeserializeOwned>(path: &Path, bytes: &[u8], start: u64) -> (Vec<T>, usize) {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = bytes[pos..].iter().position(|b| *b == b'\n') {
        let line = &bytes[pos..pos + rel];
        let line_offset = start + pos as u64;
        pos += rel + 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<T>(line) {
            Ok(record) => out.push(record),
            Err(e) => warn!(
                path = %path.display(),
                offset = line_offset,
                error = %e,
                "skipping malformed log line"
            ),
        }
    }
    (out, pos)
}

/// One shared [`EventLog`] per session, keyed by file stem so that no two
/// handles ever write the same file.
#[derive(Debug)]
pub struct EventLogRegistry {
    dir: PathBuf,
    logs: Mutex<HashMap<String, Arc<EventLog>>>,
}

impl EventLogRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn open(&self, session_key: &str) -> Arc<EventLog> {
        let mut logs = self.logs.lock().await;
        Arc::clone(
            logs.entry(sanitize_session_key(session_key))
                .or_insert_with(|| Arc::new(EventLog::open(&self.dir, session_key))),
        )
    }

    /// Session keys with a log on disk, decoded from their file stems, sorted.
    pub async fn session_keys(&self) -> LogResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EventLogError::io(&self.dir, e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EventLogError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".meta.jsonl") {
                continue;
            }
            let Some(stem) = name.strip_suffix(".jsonl") else {
                continue;
            };
            match session_key_from_stem(stem) {
                Some(key) => keys.push(key),
                None => warn!(file = %name, "ignoring log with an undecodable name"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Open every session found on disk.
    pub async fn open_all(&self) -> LogResult<Vec<Arc<EventLog>>> {
        let mut logs = Vec::new();
        for key in self.session_keys().await? {
            logs.push(self.open(&key).await);
        }
        Ok(logs)
    }
}
