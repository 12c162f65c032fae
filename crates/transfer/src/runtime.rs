//! Seam between file transfer tasks and whatever actually moves the bytes.
//!
//! A runtime is handed a staged body and a destination, performs the upload
//! on its own schedule, and reports back through a channel it received at
//! construction. Callbacks are keyed by [`TaskId`] only; the receiver is
//! responsible for routing them to the owning task.

use coursework_protocol::FileRecord;
use tokio::sync::mpsc;

use crate::staging::StagedBody;
use crate::task::TaskId;
use crate::TransferError;

/// Everything a runtime needs to start one upload.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub task_id: TaskId,
    pub url: String,
    pub content_type: String,
    pub body: StagedBody,
}

/// Callback delivered by a runtime.
#[derive(Debug)]
pub enum TransferEvent {
    /// Bytes sent so far. `bytes_total` is -1 while unknown.
    Progress {
        task_id: TaskId,
        bytes_sent: i64,
        bytes_total: i64,
    },
    /// The transfer reached a terminal state.
    Finished {
        task_id: TaskId,
        result: Result<FileRecord, TransferError>,
    },
}

impl TransferEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Progress { task_id, .. } | Self::Finished { task_id, .. } => *task_id,
        }
    }
}

pub type TransferEventSender = mpsc::Sender<TransferEvent>;
pub type TransferEventReceiver = mpsc::Receiver<TransferEvent>;

/// Creates the channel a runtime reports into.
pub fn transfer_channel(capacity: usize) -> (TransferEventSender, TransferEventReceiver) {
    mpsc::channel(capacity)
}

/// A background-capable transfer session.
///
/// `start` must return promptly; progress and completion arrive later as
/// [`TransferEvent`]s. `cancel` asks for an in-flight transfer to stop and is
/// a no-op for unknown or finished tasks.
pub trait TransferRuntime: Send + Sync {
    fn start(&self, request: TransferRequest) -> Result<(), TransferError>;

    fn cancel(&self, task_id: TaskId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_task_id() {
        let id = TaskId::new();
        let progress = TransferEvent::Progress {
            task_id: id,
            bytes_sent: 1,
            bytes_total: -1,
        };
        let finished = TransferEvent::Finished {
            task_id: id,
            result: Err(TransferError::Cancelled),
        };
        assert_eq!(progress.task_id(), id);
        assert_eq!(finished.task_id(), id);
    }

    #[tokio::test]
    async fn channel_delivers_in_order() {
        let (tx, mut rx) = transfer_channel(4);
        let id = TaskId::new();
        for sent in [10, 20] {
            tx.send(TransferEvent::Progress {
                task_id: id,
                bytes_sent: sent,
                bytes_total: 20,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(TransferEvent::Progress { bytes_sent, .. }) = rx.recv().await {
            seen.push(bytes_sent);
        }
        assert_eq!(seen, vec![10, 20]);
    }
}
