//! Remote API trait used by the submission flow.
//!
//! The coordinator only needs two calls from the server. Keeping them behind
//! a trait lets the flow run against a mock in tests; the real
//! implementation is [`coursework_api::Client`].

use std::future::Future;
use std::pin::Pin;

use coursework_api::{Client, submission_files_path};
use coursework_protocol::{
    CreateSubmissionRequest, SubmissionRecord, UploadTarget, UploadTargetRequest,
};
use coursework_transfer::TransferError;

use crate::types::AssignmentRef;

pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Server calls made on behalf of a submission.
pub trait RemoteApi: Send + Sync {
    /// Resolves an upload destination for a file attached to `assignment`.
    fn resolve_upload_target<'a>(
        &'a self,
        assignment: &'a AssignmentRef,
        request: &'a UploadTargetRequest,
    ) -> RemoteFuture<'a, UploadTarget>;

    /// Creates the submission record.
    fn create_submission<'a>(
        &'a self,
        assignment: &'a AssignmentRef,
        request: &'a CreateSubmissionRequest,
    ) -> RemoteFuture<'a, SubmissionRecord>;
}

impl RemoteApi for Client {
    fn resolve_upload_target<'a>(
        &'a self,
        assignment: &'a AssignmentRef,
        request: &'a UploadTargetRequest,
    ) -> RemoteFuture<'a, UploadTarget> {
        Box::pin(async move {
            let path = submission_files_path(&assignment.course_id, &assignment.assignment_id);
            Ok(Client::resolve_upload_target(self, &path, request).await?)
        })
    }

    fn create_submission<'a>(
        &'a self,
        assignment: &'a AssignmentRef,
        request: &'a CreateSubmissionRequest,
    ) -> RemoteFuture<'a, SubmissionRecord> {
        Box::pin(async move {
            Ok(Client::create_submission(
                self,
                &assignment.course_id,
                &assignment.assignment_id,
                request,
            )
            .await?)
        })
    }
}
