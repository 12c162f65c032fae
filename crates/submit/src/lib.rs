//! Submission upload flow: file transfers, orchestration, checkpoints.
//!
//! This crate implements the **business logic** of turning a text entry, a
//! URL or a set of files into a submission on the coursework platform. The
//! server is reached through [`RemoteApi`] and bytes are moved by a
//! [`coursework_transfer::TransferRuntime`], so the flow is testable with
//! mocks.
//!
//! # Pipeline
//!
//! 1. **Create** checkpoint the new submission as pending
//! 2. **Prepare** resolve an upload target per file, encode, stage
//! 3. **Transfer** hand staged bodies to the runtime, track callbacks
//! 4. **Submit** post the submission once every file completed
//!
//! A failing file cancels its siblings and fails the submission. Nothing is
//! retried automatically.

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod owner;
pub mod remote;
pub mod store;
pub mod types;
mod upload;

pub use aggregate::{CompletionOutcome, FailureOutcome, FileUploadAggregate};
pub use coordinator::{SubmissionHandle, UploadCoordinator};
pub use error::SubmitError;
pub use owner::ProcessOwner;
pub use remote::{RemoteApi, RemoteFuture};
pub use store::{
    JsonFileStore, MemoryStore, StoreError, SubmissionPayload, SubmissionSnapshot,
    SubmissionStore,
};
pub use types::{
    AssignmentRef, FileSource, SubmissionId, SubmissionKind, SubmissionRequest, SubmitConfig,
    SubmitEvent, detect_content_type,
};
