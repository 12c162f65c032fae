//! Submission flow error types.

use crate::store::StoreError;
use crate::types::SubmissionId;

/// Errors returned to callers of the submission flow.
///
/// Failures that happen after a submission was accepted are not returned
/// here; they are recorded on the submission itself.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] coursework_transfer::TransferError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("file submission has no files")]
    NoFiles,

    #[error("submission {0} not found")]
    NotFound(SubmissionId),

    #[error("submission worker stopped")]
    Closed,
}
