//! The set of file transfers belonging to one submission.

use std::path::PathBuf;

use coursework_protocol::{FileRecord, RecordedError, TransferProgress, UploadStatus};
use coursework_transfer::{TaskId, TransferTask, combine_progress};
use serde::{Deserialize, Serialize};

/// Result of reporting a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Every task is now completed.
    AllCompleted,
    /// Other tasks are still outstanding.
    Pending,
    /// Unknown task, or a task that was already terminal.
    Ignored,
}

/// Result of reporting a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The task failed and these siblings were cancelled as a consequence.
    Failed { cancelled: Vec<TaskId> },
    /// Unknown task, or a task that was already terminal.
    Ignored,
}

/// Ordered file transfers of one submission.
///
/// A failure of one task cancels every sibling that has not finished yet.
/// Nothing is ever retried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileUploadAggregate {
    tasks: Vec<TransferTask>,
}

impl FileUploadAggregate {
    pub fn new(tasks: Vec<TransferTask>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[TransferTask] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, id: TaskId) -> Option<&TransferTask> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut TransferTask> {
        self.tasks.iter_mut().find(|t| t.id() == id)
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(TransferTask::id).collect()
    }

    /// Binds a pending task to its staged body and marks it in progress.
    pub fn begin(&mut self, id: TaskId, path: PathBuf, total_bytes: u64) -> bool {
        self.task_mut(id)
            .is_some_and(|task| task.begin(path, total_bytes))
    }

    pub fn record_progress(&mut self, id: TaskId, sent: i64, total: i64) -> bool {
        self.task_mut(id)
            .is_some_and(|task| task.record_progress(sent, total))
    }

    /// True iff every task completed.
    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| t.status() == UploadStatus::Completed)
    }

    pub fn on_task_completed(&mut self, id: TaskId, file: FileRecord) -> CompletionOutcome {
        let Some(task) = self.task_mut(id) else {
            return CompletionOutcome::Ignored;
        };
        if !task.complete(file) {
            return CompletionOutcome::Ignored;
        }
        if self.is_complete() {
            CompletionOutcome::AllCompleted
        } else {
            CompletionOutcome::Pending
        }
    }

    pub fn on_task_failed(&mut self, id: TaskId, error: RecordedError) -> FailureOutcome {
        let Some(task) = self.task_mut(id) else {
            return FailureOutcome::Ignored;
        };
        if !task.fail(error) {
            return FailureOutcome::Ignored;
        }
        FailureOutcome::Failed {
            cancelled: self.cancel_all(),
        }
    }

    /// Cancels every non-terminal task and returns the ids that changed.
    pub fn cancel_all(&mut self) -> Vec<TaskId> {
        self.tasks
            .iter_mut()
            .filter_map(|task| task.cancel().then(|| task.id()))
            .collect()
    }

    /// Fails every non-terminal task with `error`.
    pub fn fail_outstanding(&mut self, error: &RecordedError) -> Vec<TaskId> {
        self.tasks
            .iter_mut()
            .filter_map(|task| task.fail(error.clone()).then(|| task.id()))
            .collect()
    }

    /// Remote ids of completed files, in task order.
    pub fn file_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| t.file().map(|f| f.id.clone()))
            .collect()
    }

    /// Combined progress of all tasks.
    pub fn progress(&self) -> TransferProgress {
        combine_progress(self.tasks.iter().map(TransferTask::progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursework_protocol::ErrorKind;

    fn file(id: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            display_name: String::new(),
            filename: String::new(),
            content_type: String::new(),
            size: 0,
            url: String::new(),
        }
    }

    fn started(names: &[&str]) -> FileUploadAggregate {
        let mut agg = FileUploadAggregate::new(names.iter().map(|n| TransferTask::new(*n)).collect());
        for (i, id) in agg.task_ids().into_iter().enumerate() {
            assert!(agg.begin(id, PathBuf::from(format!("/tmp/{i}.tmp")), 10));
        }
        agg
    }

    fn transport(msg: &str) -> RecordedError {
        RecordedError::new(ErrorKind::Transport, msg)
    }

    #[test]
    fn all_completed_only_after_last_task() {
        let mut agg = started(&["a", "b", "c"]);
        let ids = agg.task_ids();
        assert_eq!(agg.on_task_completed(ids[1], file("2")), CompletionOutcome::Pending);
        assert_eq!(agg.on_task_completed(ids[0], file("1")), CompletionOutcome::Pending);
        assert!(!agg.is_complete());
        assert_eq!(agg.on_task_completed(ids[2], file("3")), CompletionOutcome::AllCompleted);
        assert!(agg.is_complete());
        assert_eq!(agg.file_ids(), vec!["1", "2", "3"]);
    }

    #[test]
    fn duplicate_completion_ignored() {
        let mut agg = started(&["a", "b"]);
        let ids = agg.task_ids();
        assert_eq!(agg.on_task_completed(ids[0], file("1")), CompletionOutcome::Pending);
        assert_eq!(agg.on_task_completed(ids[0], file("9")), CompletionOutcome::Ignored);
        assert_eq!(agg.file_ids(), vec!["1"]);
    }

    #[test]
    fn unknown_task_ignored() {
        let mut agg = started(&["a"]);
        assert_eq!(agg.on_task_completed(TaskId::new(), file("1")), CompletionOutcome::Ignored);
        assert_eq!(agg.on_task_failed(TaskId::new(), transport("x")), FailureOutcome::Ignored);
    }

    #[test]
    fn failure_cancels_outstanding_siblings_once() {
        let mut agg = started(&["a", "b", "c"]);
        let ids = agg.task_ids();
        agg.on_task_completed(ids[0], file("1"));

        let outcome = agg.on_task_failed(ids[1], transport("reset"));
        assert_eq!(outcome, FailureOutcome::Failed { cancelled: vec![ids[2]] });

        assert_eq!(agg.task(ids[0]).unwrap().status(), UploadStatus::Completed);
        assert_eq!(agg.task(ids[1]).unwrap().status(), UploadStatus::Failed);
        assert_eq!(agg.task(ids[2]).unwrap().status(), UploadStatus::Cancelled);

        // A second failure report and the late cancellation callback change nothing.
        assert_eq!(agg.on_task_failed(ids[1], transport("again")), FailureOutcome::Ignored);
        assert_eq!(agg.on_task_failed(ids[2], transport("cancelled")), FailureOutcome::Ignored);
        assert!(agg.cancel_all().is_empty());
    }

    #[test]
    fn cancel_all_skips_terminal_tasks() {
        let mut agg = started(&["a", "b"]);
        let ids = agg.task_ids();
        agg.on_task_completed(ids[0], file("1"));
        assert_eq!(agg.cancel_all(), vec![ids[1]]);
        assert_eq!(agg.task(ids[0]).unwrap().status(), UploadStatus::Completed);
    }

    #[test]
    fn fail_outstanding_marks_pending_and_running() {
        let mut agg = FileUploadAggregate::new(vec![TransferTask::new("a"), TransferTask::new("b")]);
        let ids = agg.task_ids();
        agg.begin(ids[0], PathBuf::from("/tmp/a.tmp"), 1);
        let failed = agg.fail_outstanding(&transport("interrupted"));
        assert_eq!(failed, ids);
        assert!(agg.tasks().iter().all(|t| t.status() == UploadStatus::Failed));
    }

    #[test]
    fn progress_sums_tasks() {
        let mut agg = started(&["a", "b"]);
        let ids = agg.task_ids();
        agg.record_progress(ids[0], 4, 10);
        agg.record_progress(ids[1], 6, 10);
        let p = agg.progress();
        assert_eq!(p.bytes_sent, 10);
        assert_eq!(p.bytes_total, 20);
    }

    #[test]
    fn serializes_as_task_list() {
        let agg = started(&["a"]);
        let json = serde_json::to_value(&agg).unwrap();
        assert!(json.is_array());
        let parsed: FileUploadAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, agg);
    }
}
