use super::types::{ReflectionRecord, Severity};
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const TOP_DIAGNOSES: usize = 5;

/// Per-day rollup of the reflection journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyDigest {
    pub date: NaiveDate,
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub auto_fixed: usize,
    pub needs_review: usize,
    pub top_diagnoses: Vec<String>,
}

/// Dated append-only journal: one JSON record per line in
/// `<dir>/<YYYY-MM-DD>.jsonl`.
pub struct ReflectionJournal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ReflectionJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub async fn append(&self, record: &ReflectionRecord) -> anyhow::Result<()> {
        let path = self.day_path(record.timestamp.date_naive());
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {}", self.dir.display()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Records journaled on `date`. Malformed lines are skipped.
    pub async fn read_day(&self, date: NaiveDate) -> anyhow::Result<Vec<ReflectionRecord>> {
        let path = self.day_path(date);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed reflection record");
                    None
                }
            })
            .collect())
    }

    pub async fn digest(&self, date: NaiveDate) -> anyhow::Result<DailyDigest> {
        Ok(summarize(date, &self.read_day(date).await?))
    }
}

pub fn summarize(date: NaiveDate, records: &[ReflectionRecord]) -> DailyDigest {
    let count = |severity: Severity| records.iter().filter(|r| r.severity == severity).count();

    // Frequency, then first appearance.
    let mut seen: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        seen.entry(record.diagnosis.as_str()).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(&str, (usize, usize))> = seen.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));

    DailyDigest {
        date,
        total: records.len(),
        low: count(Severity::Low),
        medium: count(Severity::Medium),
        high: count(Severity::High),
        auto_fixed: records.iter().filter(|r| r.auto_fix_applied).count(),
        needs_review: records.iter().filter(|r| r.needs_human_review).count(),
        top_diagnoses: ranked
            .into_iter()
            .take(TOP_DIAGNOSES)
            .map(|(diagnosis, _)| diagnosis.to_string())
            .collect(),
    }
}
