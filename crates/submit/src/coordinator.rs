//! Upload coordinator for concurrent submissions.
//!
//! Accepts submission requests, spawns one worker per submission, and routes
//! the transfer runtime's callbacks to the worker that owns each task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use coursework_protocol::UploadStatus;
use coursework_transfer::{
    TaskId, TransferEvent, TransferEventReceiver, TransferRuntime, TransferTask,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate::FileUploadAggregate;
use crate::error::SubmitError;
use crate::owner::ProcessOwner;
use crate::remote::RemoteApi;
use crate::store::{SubmissionPayload, SubmissionSnapshot, SubmissionStore};
use crate::types::{SubmissionId, SubmissionKind, SubmissionRequest, SubmitConfig, SubmitEvent};
use crate::upload::{Shared, SubmissionUpload};

/// Maps task ids to the inbox of the submission that owns them.
#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, SubmissionId>,
    inboxes: HashMap<SubmissionId, mpsc::Sender<TransferEvent>>,
}

impl Registry {
    fn register(
        &mut self,
        id: SubmissionId,
        tasks: &[TaskId],
        inbox: mpsc::Sender<TransferEvent>,
    ) {
        for task in tasks {
            self.tasks.insert(*task, id);
        }
        self.inboxes.insert(id, inbox);
    }

    fn unregister(&mut self, id: SubmissionId) {
        self.inboxes.remove(&id);
        self.tasks.retain(|_, owner| *owner != id);
    }

    fn route(&self, task: TaskId) -> Option<mpsc::Sender<TransferEvent>> {
        self.tasks
            .get(&task)
            .and_then(|owner| self.inboxes.get(owner))
            .cloned()
    }

    fn is_active(&self, id: SubmissionId) -> bool {
        self.inboxes.contains_key(&id)
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer and control handle for one submission.
#[derive(Clone)]
pub struct SubmissionHandle {
    id: SubmissionId,
    status: watch::Receiver<SubmissionSnapshot>,
    cancel: CancellationToken,
}

impl SubmissionHandle {
    pub fn id(&self) -> SubmissionId {
        self.id
    }

    pub fn status(&self) -> UploadStatus {
        self.status.borrow().status
    }

    /// The latest committed state.
    pub fn snapshot(&self) -> SubmissionSnapshot {
        self.status.borrow().clone()
    }

    /// Requests cancellation. Has no effect once the submission is terminal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the submission to reach a terminal state.
    pub async fn wait(&self) -> Result<SubmissionSnapshot, SubmitError> {
        let mut rx = self.status.clone();
        let snapshot = rx
            .wait_for(SubmissionSnapshot::is_terminal)
            .await
            .map_err(|_| SubmitError::Closed)?;
        Ok(snapshot.clone())
    }
}

/// Runs submissions against one remote API and one transfer runtime.
pub struct UploadCoordinator {
    shared: Arc<Shared>,
    registry: Arc<Mutex<Registry>>,
    owner: ProcessOwner,
    events_rx: Option<mpsc::Receiver<SubmitEvent>>,
}

impl UploadCoordinator {
    /// Creates a coordinator and spawns its dispatcher.
    ///
    /// `transfer_events` must be the receiving end of the channel `runtime`
    /// reports into. Must be called within a Tokio runtime.
    pub fn new(
        api: Arc<dyn RemoteApi>,
        runtime: Arc<dyn TransferRuntime>,
        store: Arc<dyn SubmissionStore>,
        transfer_events: TransferEventReceiver,
        config: SubmitConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
        let registry = Arc::new(Mutex::new(Registry::default()));
        tokio::spawn(dispatch(transfer_events, registry.clone()));

        Self {
            shared: Arc::new(Shared {
                api,
                runtime,
                store,
                config,
                events: events_tx,
            }),
            registry,
            owner: ProcessOwner::current(),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SubmitEvent>> {
        self.events_rx.take()
    }

    /// Creates a submission, checkpoints it and starts working on it.
    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmissionHandle, SubmitError> {
        let SubmissionRequest {
            assignment,
            kind,
            comment,
        } = request;

        let (payload, files) = match kind {
            SubmissionKind::Text { body } => (SubmissionPayload::Text { body }, Vec::new()),
            SubmissionKind::Url { url } => (SubmissionPayload::Url { url }, Vec::new()),
            SubmissionKind::Files(files) if files.is_empty() => return Err(SubmitError::NoFiles),
            SubmissionKind::Files(files) => (SubmissionPayload::Files, files),
        };

        let aggregate = FileUploadAggregate::new(
            files
                .iter()
                .map(|f| TransferTask::new(f.name.clone()))
                .collect(),
        );
        let id = SubmissionId::new();
        let mut snapshot = SubmissionSnapshot::new(id, assignment, payload, comment, aggregate);
        snapshot.owner = Some(self.owner);
        self.shared.store.save(&snapshot)?;
        info!(
            %id,
            course = %snapshot.assignment.course_id,
            assignment = %snapshot.assignment.assignment_id,
            files = files.len(),
            "submission created"
        );

        let capacity = self.shared.config.channel_capacity.max(1);
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
        lock(&self.registry).register(id, &snapshot.aggregate.task_ids(), inbox_tx);

        let (status_tx, status_rx) = watch::channel(snapshot.clone());
        let cancel = CancellationToken::new();
        let upload = SubmissionUpload::new(
            snapshot,
            files,
            self.shared.clone(),
            status_tx,
            cancel.clone(),
        );

        let _ = self.shared.events.try_send(SubmitEvent::StatusChanged {
            id,
            status: UploadStatus::Pending,
        });

        let registry = self.registry.clone();
        tokio::spawn(async move {
            upload.run(inbox_rx).await;
            lock(&registry).unregister(id);
        });

        Ok(SubmissionHandle {
            id,
            status: status_rx,
            cancel,
        })
    }

    /// Loads the last checkpoint of a submission.
    pub fn status(&self, id: SubmissionId) -> Result<SubmissionSnapshot, SubmitError> {
        self.shared
            .store
            .load(id)?
            .ok_or(SubmitError::NotFound(id))
    }

    /// All checkpointed submissions, oldest first.
    pub fn list(&self) -> Result<Vec<SubmissionSnapshot>, SubmitError> {
        Ok(self.shared.store.list()?)
    }

    /// Marks submissions left unfinished by an earlier process as failed.
    ///
    /// Submissions running in this coordinator, or owned by a process that
    /// is still alive, are skipped. Returns the snapshots that were changed.
    pub fn recover(&self) -> Result<Vec<SubmissionSnapshot>, SubmitError> {
        let mut recovered = Vec::new();
        for mut snapshot in self.shared.store.list()? {
            if snapshot.is_terminal() {
                continue;
            }
            if lock(&self.registry).is_active(snapshot.id) || snapshot.has_live_owner() {
                debug!(id = %snapshot.id, "submission still owned, not recovering");
                continue;
            }
            if snapshot.mark_interrupted() {
                self.shared.store.save(&snapshot)?;
                warn!(id = %snapshot.id, "interrupted submission marked failed");
                recovered.push(snapshot);
            }
        }
        Ok(recovered)
    }

    /// Number of submissions still being worked on.
    pub fn active(&self) -> usize {
        lock(&self.registry).inboxes.len()
    }
}

/// Routes transfer callbacks to the owning submission's inbox.
///
/// Progress is dropped when an inbox is full; terminal callbacks wait.
async fn dispatch(mut transfers: TransferEventReceiver, registry: Arc<Mutex<Registry>>) {
    while let Some(event) = transfers.recv().await {
        let task_id = event.task_id();
        let Some(inbox) = lock(&registry).route(task_id) else {
            debug!(task = %task_id, "dropping transfer event for unknown task");
            continue;
        };

        if matches!(event, TransferEvent::Progress { .. }) {
            let _ = inbox.try_send(event);
        } else if inbox.send(event).await.is_err() {
            debug!(task = %task_id, "submission finished before transfer callback");
        }
    }
    debug!("transfer event stream closed");
}
