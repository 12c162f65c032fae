use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use coursework_protocol::{FileRecord, RecordedError, TransferProgress, UploadStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local identifier of one file transfer.
///
/// Assigned before the remote system knows about the file, and used to
/// correlate runtime callbacks back to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State of one outbound file transfer.
///
/// Terminal states are final: only the first of `complete`, `fail` or
/// `cancel` takes effect, later calls report `false` and change nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTask {
    id: TaskId,
    file_name: String,
    status: UploadStatus,
    progress: TransferProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    staged_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RecordedError>,
    updated_at: DateTime<Utc>,
}

impl TransferTask {
    /// Creates a pending task for `file_name`.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            file_name: file_name.into(),
            status: UploadStatus::Pending,
            progress: TransferProgress::default(),
            staged_path: None,
            file: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn progress(&self) -> TransferProgress {
        self.progress
    }

    pub fn staged_path(&self) -> Option<&Path> {
        self.staged_path.as_deref()
    }

    /// The uploaded file, once the task completed.
    pub fn file(&self) -> Option<&FileRecord> {
        self.file.as_ref()
    }

    pub fn error(&self) -> Option<&RecordedError> {
        self.error.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Marks the task as in-progress, bound to the staged body at `path`.
    pub fn begin(&mut self, path: PathBuf, total_bytes: u64) -> bool {
        if self.status != UploadStatus::Pending {
            return false;
        }
        self.status = UploadStatus::InProgress;
        self.staged_path = Some(path);
        self.progress.bytes_total = total_bytes as i64;
        self.touch();
        true
    }

    /// Records bytes sent. Progress only moves forward.
    ///
    /// A negative `total` means the total is still unknown and keeps the
    /// current value.
    pub fn record_progress(&mut self, sent: i64, total: i64) -> bool {
        if self.status != UploadStatus::InProgress {
            return false;
        }
        let before = self.progress;
        self.progress.bytes_sent = self.progress.bytes_sent.max(sent);
        if total >= 0 {
            self.progress.bytes_total = self.progress.bytes_total.max(total);
        }
        let changed = self.progress != before;
        if changed {
            self.touch();
        }
        changed
    }

    /// Marks the task as completed with the server's file record.
    pub fn complete(&mut self, file: FileRecord) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = UploadStatus::Completed;
        if self.progress.bytes_total >= 0 {
            self.progress.bytes_sent = self.progress.bytes_total;
        }
        self.file = Some(file);
        self.touch();
        true
    }

    /// Marks the task as failed.
    pub fn fail(&mut self, error: RecordedError) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = UploadStatus::Failed;
        self.error = Some(error);
        self.touch();
        true
    }

    /// Marks the task as cancelled. Has no effect on a terminal task.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = UploadStatus::Cancelled;
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
