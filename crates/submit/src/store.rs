//! Durable checkpoints of submission state.
//!
//! Every state transition of a submission is written through a
//! [`SubmissionStore`] before anything observes it, so a restarted process
//! can report what happened last.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use coursework_protocol::{ErrorKind, RecordedError, SubmissionRecord, UploadStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::FileUploadAggregate;
use crate::owner::ProcessOwner;
use crate::types::{AssignmentRef, SubmissionId};

/// Errors from a submission store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Content of a submission as persisted. File bytes are not kept; the
/// aggregate's tasks describe the files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionPayload {
    Text { body: String },
    Url { url: String },
    Files,
}

/// Serializable state of one submission upload and its file tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    pub id: SubmissionId,
    pub assignment: AssignmentRef,
    pub payload: SubmissionPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub status: UploadStatus,
    #[serde(rename = "tasks", default)]
    pub aggregate: FileUploadAggregate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionRecord>,
    /// Process working on the submission while it is not terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ProcessOwner>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionSnapshot {
    pub fn new(
        id: SubmissionId,
        assignment: AssignmentRef,
        payload: SubmissionPayload,
        comment: Option<String>,
        aggregate: FileUploadAggregate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            assignment,
            payload,
            comment,
            status: UploadStatus::Pending,
            aggregate,
            error: None,
            submission: None,
            owner: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the process that owns this submission is still running.
    pub fn has_live_owner(&self) -> bool {
        self.owner.is_some_and(|owner| owner.is_alive())
    }

    /// Marks a submission left unfinished by an earlier process as failed.
    ///
    /// Outstanding file tasks fail with the same error. Returns false for a
    /// terminal snapshot, which is left untouched.
    pub fn mark_interrupted(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        let error = RecordedError::new(ErrorKind::Transport, "interrupted");
        self.aggregate.fail_outstanding(&error);
        self.status = UploadStatus::Failed;
        self.error = Some(error);
        self.owner = None;
        self.updated_at = Utc::now();
        true
    }
}

/// Persistence of submission snapshots.
pub trait SubmissionStore: Send + Sync {
    /// Writes `snapshot`, replacing any earlier version, as one commit.
    fn save(&self, snapshot: &SubmissionSnapshot) -> Result<(), StoreError>;

    fn load(&self, id: SubmissionId) -> Result<Option<SubmissionSnapshot>, StoreError>;

    /// All stored snapshots, oldest first.
    fn list(&self) -> Result<Vec<SubmissionSnapshot>, StoreError>;
}

/// In-process store. Keeps the status of every checkpoint for inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: HashMap<SubmissionId, SubmissionSnapshot>,
    history: Vec<(SubmissionId, UploadStatus)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status recorded by each checkpoint of `id`, in commit order.
    pub fn checkpoints(&self, id: SubmissionId) -> Vec<UploadStatus> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .history
            .iter()
            .filter(|(sid, _)| *sid == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl SubmissionStore for MemoryStore {
    fn save(&self, snapshot: &SubmissionSnapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.push((snapshot.id, snapshot.status));
        inner.snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    fn load(&self, id: SubmissionId) -> Result<Option<SubmissionSnapshot>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.snapshots.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<SubmissionSnapshot>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = inner.snapshots.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        Ok(all)
    }
}

/// One pretty-printed JSON file per submission, `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens a store in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: SubmissionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl SubmissionStore for JsonFileStore {
    fn save(&self, snapshot: &SubmissionSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(snapshot.id);
        let tmp = self.dir.join(format!("{}.json.tmp", snapshot.id));
        let content = serde_json::to_vec_pretty(snapshot)?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&content)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        debug!(id = %snapshot.id, status = ?snapshot.status, "checkpoint written");
        Ok(())
    }

    fn load(&self, id: SubmissionId) -> Result<Option<SubmissionSnapshot>, StoreError> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<SubmissionSnapshot>, StoreError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<SubmissionSnapshot>(&bytes)?));
            match parsed {
                Ok(snapshot) => all.push(snapshot),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }
        all.sort_by_key(|s| s.created_at);
        Ok(all)
    }
}
