//! Per-submission worker.
//!
//! One [`SubmissionUpload`] runs as its own task and is the only writer of
//! its submission's state. Transfer callbacks for its files arrive through
//! an inbox fed by the coordinator's dispatcher, so callbacks from sibling
//! transfers never interleave.
//!
//! The pipeline:
//! 1. **Begin** checkpoint InProgress
//! 2. **Prepare** resolve, encode and stage every file concurrently
//! 3. **Transfer** start every file and wait for the runtime's callbacks
//! 4. **Submit** post the submission once, after every file completed

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use coursework_protocol::{
    CreateSubmissionRequest, ErrorKind, FileRecord, RecordedError, SubmissionParams,
    UploadStatus, UploadTarget, UploadTargetRequest,
};
use coursework_transfer::{
    StagedBody, TaskId, TransferError, TransferEvent, TransferRequest, TransferRuntime,
    encode_multipart_body, multipart_content_type,
};
use futures_util::future::join_all;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{CompletionOutcome, FailureOutcome};
use crate::remote::RemoteApi;
use crate::store::{StoreError, SubmissionPayload, SubmissionSnapshot, SubmissionStore};
use crate::types::{AssignmentRef, FileSource, SubmitConfig, SubmitEvent};

/// Collaborators shared by every submission of one coordinator.
pub(crate) struct Shared {
    pub api: Arc<dyn RemoteApi>,
    pub runtime: Arc<dyn TransferRuntime>,
    pub store: Arc<dyn SubmissionStore>,
    pub config: SubmitConfig,
    pub events: mpsc::Sender<SubmitEvent>,
}

/// A file ready to be handed to the transfer runtime.
struct PreparedFile {
    url: String,
    body: StagedBody,
}

pub(crate) struct SubmissionUpload {
    snapshot: SubmissionSnapshot,
    files: Vec<FileSource>,
    shared: Arc<Shared>,
    status_tx: watch::Sender<SubmissionSnapshot>,
    cancel: CancellationToken,
    posted: bool,
    announced: UploadStatus,
}

impl SubmissionUpload {
    pub(crate) fn new(
        snapshot: SubmissionSnapshot,
        files: Vec<FileSource>,
        shared: Arc<Shared>,
        status_tx: watch::Sender<SubmissionSnapshot>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            snapshot,
            files,
            shared,
            status_tx,
            cancel,
            posted: false,
            announced: UploadStatus::Pending,
        }
    }

    /// Drives the submission to a terminal state and returns it.
    pub(crate) async fn run(
        mut self,
        mut inbox: mpsc::Receiver<TransferEvent>,
    ) -> SubmissionSnapshot {
        self.begin().await;

        let cancel = self.cancel.clone();
        while !self.snapshot.is_terminal() {
            tokio::select! {
                _ = cancel.cancelled() => self.cancel_now(),
                event = inbox.recv() => match event {
                    Some(event) => self.on_transfer_event(event).await,
                    None => self.fail(RecordedError::new(
                        ErrorKind::Transport,
                        "transfer event stream closed",
                    )),
                },
            }
        }

        info!(id = %self.snapshot.id, status = ?self.snapshot.status, "submission finished");
        self.snapshot
    }

    async fn begin(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel_now();
            return;
        }

        self.snapshot.status = UploadStatus::InProgress;
        self.commit();
        self.emit_status();
        if self.snapshot.is_terminal() {
            return;
        }

        if matches!(self.snapshot.payload, SubmissionPayload::Files) {
            let files = std::mem::take(&mut self.files);
            self.start_files(files).await;
        } else {
            self.post_submission().await;
        }
    }

    /// Resolves, encodes and stages every file, then starts the transfers.
    async fn start_files(&mut self, files: Vec<FileSource>) {
        let ids = self.snapshot.aggregate.task_ids();
        let assignment = self.snapshot.assignment.clone();
        let shared = self.shared.clone();
        let cancel = self.cancel.clone();

        info!(id = %self.snapshot.id, files = files.len(), "preparing files");
        let results = join_all(
            files
                .into_iter()
                .map(|file| prepare_file(&shared, &assignment, file, &cancel)),
        )
        .await;

        let mut ready = Vec::with_capacity(results.len());
        let mut failure = None;
        for (task_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(prepared) => ready.push((task_id, prepared)),
                Err(e) => {
                    warn!(id = %self.snapshot.id, task = %task_id, error = %e, "file preparation failed");
                    if failure.is_none() {
                        failure = Some((task_id, e));
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            discard(ready.iter().map(|(_, p)| &p.body));
            self.cancel_now();
            return;
        }
        if let Some((task_id, e)) = failure {
            discard(ready.iter().map(|(_, p)| &p.body));
            self.on_task_failed(task_id, e.to_recorded());
            return;
        }

        let mut pending = ready.into_iter();
        while let Some((task_id, prepared)) = pending.next() {
            let staged = prepared.body.clone();
            let path = staged.path().to_path_buf();
            let len = staged.len();
            let request = TransferRequest {
                task_id,
                url: prepared.url,
                content_type: multipart_content_type(),
                body: prepared.body,
            };
            self.snapshot.aggregate.begin(task_id, path, len);

            if let Err(e) = self.shared.runtime.start(request) {
                error!(id = %self.snapshot.id, task = %task_id, error = %e, "failed to start transfer");
                let rest: Vec<_> = pending.by_ref().collect();
                discard(std::iter::once(&staged).chain(rest.iter().map(|(_, p)| &p.body)));
                self.on_task_failed(task_id, e.to_recorded());
                return;
            }
            debug!(id = %self.snapshot.id, task = %task_id, bytes = len, "transfer started");
        }

        self.commit();
    }

    async fn on_transfer_event(&mut self, event: TransferEvent) {
        match event {
            TransferEvent::Progress {
                task_id,
                bytes_sent,
                bytes_total,
            } => {
                if self
                    .snapshot
                    .aggregate
                    .record_progress(task_id, bytes_sent, bytes_total)
                {
                    let progress = self
                        .snapshot
                        .aggregate
                        .task(task_id)
                        .map(|t| t.progress())
                        .unwrap_or_default();
                    self.emit(SubmitEvent::FileProgress {
                        id: self.snapshot.id,
                        task_id,
                        bytes_sent: progress.bytes_sent,
                        bytes_total: progress.bytes_total,
                    });
                }
            }
            TransferEvent::Finished {
                task_id,
                result: Ok(file),
            } => self.on_task_completed(task_id, file).await,
            TransferEvent::Finished {
                task_id,
                result: Err(e),
            } => self.on_task_failed(task_id, e.to_recorded()),
        }
    }

    async fn on_task_completed(&mut self, task_id: TaskId, file: FileRecord) {
        let outcome = self
            .snapshot
            .aggregate
            .on_task_completed(task_id, file.clone());
        if outcome == CompletionOutcome::Ignored {
            debug!(id = %self.snapshot.id, task = %task_id, "ignoring completion");
            return;
        }

        self.commit();
        self.emit(SubmitEvent::FileCompleted {
            id: self.snapshot.id,
            task_id,
            file,
        });

        if outcome == CompletionOutcome::AllCompleted && !self.snapshot.is_terminal() {
            self.post_submission().await;
        }
    }

    fn on_task_failed(&mut self, task_id: TaskId, error: RecordedError) {
        let cancelled = match self
            .snapshot
            .aggregate
            .on_task_failed(task_id, error.clone())
        {
            FailureOutcome::Ignored => {
                debug!(id = %self.snapshot.id, task = %task_id, "ignoring failure");
                return;
            }
            FailureOutcome::Failed { cancelled } => cancelled,
        };

        for id in &cancelled {
            self.shared.runtime.cancel(*id);
        }
        warn!(
            id = %self.snapshot.id,
            task = %task_id,
            cancelled = cancelled.len(),
            error = %error,
            "file failed"
        );

        self.snapshot.status = UploadStatus::Failed;
        self.snapshot.error = Some(error.clone());
        self.commit();
        self.emit(SubmitEvent::FileFailed {
            id: self.snapshot.id,
            task_id,
            error,
        });
        self.emit_status();
    }

    /// Posts the submission. Runs at most once per submission.
    async fn post_submission(&mut self) {
        if self.posted {
            return;
        }
        self.posted = true;

        let submission = match &self.snapshot.payload {
            SubmissionPayload::Text { body } => {
                SubmissionParams::OnlineTextEntry { body: body.clone() }
            }
            SubmissionPayload::Url { url } => SubmissionParams::OnlineUrl { url: url.clone() },
            SubmissionPayload::Files => SubmissionParams::OnlineUpload {
                file_ids: self.snapshot.aggregate.file_ids(),
            },
        };
        let request = CreateSubmissionRequest {
            submission,
            comment: self.snapshot.comment.clone(),
        };

        info!(
            id = %self.snapshot.id,
            submission_type = request.submission.submission_type(),
            "posting submission"
        );
        let api = self.shared.api.clone();
        let cancel = self.cancel.clone();
        let assignment = self.snapshot.assignment.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            r = api.create_submission(&assignment, &request) => Some(r),
        };

        match result {
            None => self.cancel_now(),
            Some(Ok(record)) => {
                self.snapshot.submission = Some(record);
                self.snapshot.status = UploadStatus::Completed;
                self.commit();
                self.emit_status();
            }
            Some(Err(e)) => self.fail(e.to_recorded()),
        }
    }

    fn cancel_now(&mut self) {
        if self.snapshot.is_terminal() {
            return;
        }
        for id in self.snapshot.aggregate.cancel_all() {
            self.shared.runtime.cancel(id);
        }
        info!(id = %self.snapshot.id, "submission cancelled");
        self.snapshot.status = UploadStatus::Cancelled;
        self.commit();
        self.emit_status();
    }

    fn fail(&mut self, error: RecordedError) {
        if self.snapshot.is_terminal() {
            return;
        }
        for id in self.snapshot.aggregate.cancel_all() {
            self.shared.runtime.cancel(id);
        }
        warn!(id = %self.snapshot.id, error = %error, "submission failed");
        self.snapshot.status = UploadStatus::Failed;
        self.snapshot.error = Some(error);
        self.commit();
        self.emit_status();
    }

    /// Writes a checkpoint and publishes the state to status watchers.
    ///
    /// A store failure on a non-terminal submission fails it with a
    /// `storage` error.
    fn commit(&mut self) {
        self.snapshot.updated_at = Utc::now();
        if let Err(e) = save_checkpoint(self.shared.store.as_ref(), &self.snapshot) {
            error!(id = %self.snapshot.id, error = %e, "checkpoint failed");
            if !self.snapshot.is_terminal() {
                for id in self.snapshot.aggregate.cancel_all() {
                    self.shared.runtime.cancel(id);
                }
                self.snapshot.status = UploadStatus::Failed;
                self.snapshot.error = Some(RecordedError::new(ErrorKind::Storage, e.to_string()));
                if let Err(e) = save_checkpoint(self.shared.store.as_ref(), &self.snapshot) {
                    error!(id = %self.snapshot.id, error = %e, "checkpoint retry failed");
                }
                self.emit_status();
            }
        }
        self.status_tx.send_replace(self.snapshot.clone());
    }

    /// Emits the status change and, for a terminal status, the final result.
    /// A status is announced once.
    fn emit_status(&mut self) {
        if self.snapshot.status == self.announced {
            return;
        }
        self.announced = self.snapshot.status;
        let id = self.snapshot.id;
        self.emit(SubmitEvent::StatusChanged {
            id,
            status: self.snapshot.status,
        });
        match self.snapshot.status {
            UploadStatus::Completed => {
                if let Some(submission) = &self.snapshot.submission {
                    self.emit(SubmitEvent::Completed {
                        id,
                        submission: submission.clone(),
                    });
                }
            }
            UploadStatus::Failed => {
                if let Some(error) = &self.snapshot.error {
                    self.emit(SubmitEvent::Failed {
                        id,
                        error: error.clone(),
                    });
                }
            }
            UploadStatus::Cancelled => self.emit(SubmitEvent::Cancelled { id }),
            UploadStatus::Pending | UploadStatus::InProgress => {}
        }
    }

    fn emit(&self, event: SubmitEvent) {
        if let Err(e) = self.shared.events.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    debug!(id = %event.submission_id(), "event receiver lagging, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

async fn prepare_file(
    shared: &Shared,
    assignment: &AssignmentRef,
    file: FileSource,
    cancel: &CancellationToken,
) -> Result<PreparedFile, TransferError> {
    let request = UploadTargetRequest::new(
        file.name.clone(),
        file.data.len() as u64,
        file.content_type.clone(),
        None,
        shared.config.overwrite,
    );

    let target = tokio::select! {
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        r = shared.api.resolve_upload_target(assignment, &request) => r?,
    };
    let UploadTarget {
        upload_url,
        upload_params,
    } = target;
    debug!(file = %file.name, url = %upload_url, "upload target resolved");

    let dir: PathBuf = shared.config.staging_dir.clone();
    let body = tokio::task::spawn_blocking(move || {
        let encoded = encode_multipart_body(&file.data, &upload_params)?;
        StagedBody::write(&dir, &encoded)
    })
    .await
    .map_err(|e| TransferError::Transport(e.to_string()))??;

    Ok(PreparedFile {
        url: upload_url,
        body,
    })
}

/// Writes a checkpoint. On a multi-threaded runtime the worker hands its
/// other tasks off first; the write still completes before the caller
/// continues.
fn save_checkpoint(
    store: &dyn SubmissionStore,
    snapshot: &SubmissionSnapshot,
) -> Result<(), StoreError> {
    let multi_thread = tokio::runtime::Handle::try_current()
        .is_ok_and(|h| matches!(h.runtime_flavor(), RuntimeFlavor::MultiThread));
    if multi_thread {
        tokio::task::block_in_place(|| store.save(snapshot))
    } else {
        store.save(snapshot)
    }
}

/// Removes staged bodies that will never be transferred.
fn discard<'a>(bodies: impl Iterator<Item = &'a StagedBody>) {
    for body in bodies {
        if let Err(e) = body.remove() {
            warn!(path = %body.path().display(), error = %e, "failed to remove staged body");
        }
    }
}
