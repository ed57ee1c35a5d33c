use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::task::TaskTracker;

/// How a background pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(String),
    Failed(String),
}

impl TaskOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

pub type ReportReceiver = mpsc::UnboundedReceiver<TaskReport>;

/// Runs index, rebuild and reflection passes off the foreground path.
///
/// At most `max_concurrency` passes run at once. Every pass, including one
/// that panics, sends exactly one [`TaskReport`].
#[derive(Clone)]
pub struct BackgroundQueue {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    reports: mpsc::UnboundedSender<TaskReport>,
    /// Held across close, wait and reopen of `tracker`.
    idle: Arc<Mutex<()>>,
}

impl BackgroundQueue {
    pub fn new(max_concurrency: usize) -> (Self, ReportReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tracker: TaskTracker::new(),
            reports: tx,
            idle: Arc::new(Mutex::new(())),
        };
        (queue, rx)
    }

    /// Queue `task`. Its `Ok` string becomes the report's detail.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let name = name.into();
        let permits = Arc::clone(&self.permits);
        let reports = self.reports.clone();
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let started = Instant::now();
            let outcome = match tokio::spawn(task).await {
                Ok(Ok(detail)) => TaskOutcome::Completed(detail),
                Ok(Err(e)) => TaskOutcome::Failed(format!("{e:#}")),
                Err(e) => TaskOutcome::Failed(format!("task aborted: {e}")),
            };
            let elapsed = started.elapsed();
            match &outcome {
                TaskOutcome::Completed(detail) => {
                    tracing::debug!(task = %name, ?elapsed, %detail, "background pass finished");
                }
                TaskOutcome::Failed(error) => {
                    tracing::warn!(task = %name, ?elapsed, %error, "background pass failed");
                }
            }
            // A dropped receiver only means nobody is listening.
            let _ = reports.send(TaskReport {
                name,
                outcome,
                elapsed,
            });
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every queued pass has reported. Concurrent callers take
    /// turns, so one never reopens the tracker under another's wait.
    pub async fn wait_idle(&self) {
        let _turn = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
