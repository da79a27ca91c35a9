use std::fmt;

use tokio::sync::mpsc;

use crate::error::AppError;

/// One line of the progress stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Announced once, before any work: two steps per stale project.
    Total(usize),
    /// Emitted after each subtree finishes.
    Step(usize),
    Message(String),
    /// Terminal; nothing follows it.
    Failed(String),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Total(n) => write!(f, "PROGRESS_TOTAL:{}", n),
            Progress::Step(n) => write!(f, "PROGRESS_STEP:{}", n),
            Progress::Message(msg) => f.write_str(msg),
            Progress::Failed(err) => write!(f, "SYNC_ERROR:{}", err),
        }
    }
}

/// Where a sync pass reports progress. A closed receiver cancels the pass at the next
/// emission.
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<Progress>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<Progress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub async fn emit(&self, progress: Progress) -> Result<(), AppError> {
        match &self.tx {
            Some(tx) => tx.send(progress).await.map_err(|_| AppError::Cancelled),
            None => Ok(()),
        }
    }

    pub async fn total(&self, steps: usize) -> Result<(), AppError> {
        self.emit(Progress::Total(steps)).await
    }

    pub async fn step(&self) -> Result<(), AppError> {
        self.emit(Progress::Step(1)).await
    }

    pub async fn message(&self, msg: impl Into<String>) -> Result<(), AppError> {
        self.emit(Progress::Message(msg.into())).await
    }
}
