use super::chunk::{ConceptHit, ConceptIndex, IndexChunk};
use crate::config::ConceptConfig;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard, RwLock};

const INDEX_FILE: &str = "index.json";
const STATE_FILE: &str = "index.mtimes.json";

/// What the last filesystem rebuild saw: when it ran and each file's mtime
/// in milliseconds, keyed by absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, u64>,
}

/// On-disk home of the concept index.
///
/// Readers see either the previous snapshot or the next one: commits write a
/// temp file, sync it, then rename over the live file. Writers serialize on
/// `write_lock` so two rebuilds never interleave.
pub struct ConceptStore {
    index_path: PathBuf,
    state_path: PathBuf,
    config: ConceptConfig,
    write_lock: Mutex<()>,
    cached: RwLock<Option<ConceptIndex>>,
}

impl ConceptStore {
    pub fn new(dir: impl AsRef<Path>, config: ConceptConfig) -> Self {
        let dir = dir.as_ref();
        Self {
            index_path: dir.join(INDEX_FILE),
            state_path: dir.join(STATE_FILE),
            config,
            write_lock: Mutex::new(()),
            cached: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ConceptConfig {
        &self.config
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Current snapshot. A missing or unreadable file reads as empty.
    pub async fn load(&self) -> ConceptIndex {
        if let Some(index) = self.cached.read().await.as_ref() {
            return index.clone();
        }
        let index = read_json::<ConceptIndex>(&self.index_path)
            .await
            .unwrap_or_default();
        *self.cached.write().await = Some(index.clone());
        index
    }

    /// Alias for [`Self::load`] that reads better at call sites holding
    /// the result for a while.
    pub async fn snapshot(&self) -> ConceptIndex {
        self.load().await
    }

    /// Atomically replace the on-disk index with `index`.
    pub async fn commit(&self, index: &ConceptIndex) -> anyhow::Result<()> {
        write_atomic(&self.index_path, index).await?;
        *self.cached.write().await = Some(index.clone());
        tracing::debug!(
            anchors = index.anchors.len(),
            chunks = index.chunk_count(),
            "concept index committed"
        );
        Ok(())
    }

    pub async fn load_state(&self) -> RebuildState {
        read_json::<RebuildState>(&self.state_path)
            .await
            .unwrap_or_default()
    }

    pub async fn save_state(&self, state: &RebuildState) -> anyhow::Result<()> {
        write_atomic(&self.state_path, state).await
    }

    pub async fn lookup(&self, anchor: &str) -> Vec<IndexChunk> {
        self.load().await.lookup(anchor)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Vec<ConceptHit> {
        self.load().await.search(query, limit)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "concept store unreadable; starting empty");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "concept store corrupt; starting empty");
            None
        }
    }
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("create {}", tmp.display()))?;
    file.write_all(&json).await?;
    file.sync_data().await?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename {} into place", tmp.display()))?;
    Ok(())
}
