//! Wire types for the coursework submission API.

pub mod grade;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use grade::{AssignmentGrade, GradeDetails, GradeSummary, GradingType};
pub use messages::{CreateSubmissionRequest, OnDuplicate, SubmissionParams, UploadTargetRequest};
pub use types::{
    ErrorKind, FileRecord, RecordedError, SubmissionRecord, TransferProgress, UNKNOWN_TOTAL,
    UploadStatus, UploadTarget,
};
