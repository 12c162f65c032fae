//! Data types for the submission flow.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use coursework_protocol::{FileRecord, RecordedError, SubmissionRecord, UploadStatus};
use coursework_transfer::TaskId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SubmitError;

/// Local identifier of one submission upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The assignment a submission is made against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRef {
    pub course_id: String,
    pub assignment_id: String,
}

impl AssignmentRef {
    pub fn new(course_id: impl Into<String>, assignment_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            assignment_id: assignment_id.into(),
        }
    }
}

/// A file to upload as part of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileSource {
    pub fn new(name: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            data,
        }
    }

    /// Reads a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, SubmitError> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(Self {
            content_type: detect_content_type(&name).map(str::to_string),
            name,
            data,
        })
    }
}

/// Returns the MIME type for common coursework file extensions.
pub fn detect_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("pdf") => Some("application/pdf"),
        Some("txt") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        Some("html" | "htm") => Some("text/html"),
        Some("csv") => Some("text/csv"),
        Some("json") => Some("application/json"),
        Some("zip") => Some("application/zip"),
        Some("doc") => Some("application/msword"),
        Some("docx") => Some(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ),
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("mp3") => Some("audio/mpeg"),
        Some("mp4") => Some("video/mp4"),
        _ => None,
    }
}

/// What is being submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionKind {
    Text { body: String },
    Url { url: String },
    Files(Vec<FileSource>),
}

/// A request to create one submission.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub assignment: AssignmentRef,
    pub kind: SubmissionKind,
    pub comment: Option<String>,
}

/// Progress and lifecycle events emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum SubmitEvent {
    /// A submission moved to a new status. Emitted after the checkpoint.
    StatusChanged {
        id: SubmissionId,
        status: UploadStatus,
    },
    FileProgress {
        id: SubmissionId,
        task_id: TaskId,
        bytes_sent: i64,
        bytes_total: i64,
    },
    FileCompleted {
        id: SubmissionId,
        task_id: TaskId,
        file: FileRecord,
    },
    FileFailed {
        id: SubmissionId,
        task_id: TaskId,
        error: RecordedError,
    },
    /// The submission was accepted by the server.
    Completed {
        id: SubmissionId,
        submission: SubmissionRecord,
    },
    Failed {
        id: SubmissionId,
        error: RecordedError,
    },
    Cancelled { id: SubmissionId },
}

impl SubmitEvent {
    pub fn submission_id(&self) -> SubmissionId {
        match self {
            Self::StatusChanged { id, .. }
            | Self::FileProgress { id, .. }
            | Self::FileCompleted { id, .. }
            | Self::FileFailed { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => *id,
        }
    }
}

/// Settings shared by every submission of a coordinator.
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    /// Directory encoded multipart bodies are staged in.
    pub staging_dir: PathBuf,
    /// Replace same-named files instead of asking the server to rename.
    pub overwrite: bool,
    /// Capacity of the event and per-submission channels.
    pub channel_capacity: usize,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            staging_dir: std::env::temp_dir().join("coursework-staging"),
            overwrite: false,
            channel_capacity: 256,
        }
    }
}
