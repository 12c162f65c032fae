//! Application orchestrator: wires the API client, transfer runtime, store
//! and coordinator together for one command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use coursework_api::{Client, HttpTransferRuntime};
use coursework_protocol::{TransferProgress, UploadStatus};
use coursework_submit::{
    AssignmentRef, FileSource, JsonFileStore, SubmissionHandle, SubmissionId, SubmissionKind,
    SubmissionPayload, SubmissionRequest, SubmissionSnapshot, SubmitEvent, UploadCoordinator,
};
use coursework_transfer::{RateMeter, TaskId, transfer_channel};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::{Command, Target};

/// Runs one CLI command to completion.
pub async fn run(mut config: Config, command: Command) -> anyhow::Result<()> {
    if let Command::Files { overwrite: true, .. } = &command {
        config.overwrite = true;
    }

    let client = Client::new(&config.base_url, &config.token).context("invalid API settings")?;
    let (transfer_tx, transfer_rx) = transfer_channel(config.channel_capacity.max(1));
    let runtime = HttpTransferRuntime::new(client.clone(), transfer_tx)?;
    let store = JsonFileStore::open(&config.store_dir)
        .with_context(|| format!("cannot open store at {}", config.store_dir.display()))?;

    let mut coordinator = UploadCoordinator::new(
        Arc::new(client),
        Arc::new(runtime),
        Arc::new(store),
        transfer_rx,
        config.submit_config(),
    );

    let request = match command {
        Command::Status { id } => return show_status(&coordinator, id),
        Command::Text { target, body } => request(target, SubmissionKind::Text { body }),
        Command::Url { target, url } => request(target, SubmissionKind::Url { url }),
        Command::Files { target, files, .. } => {
            request(target, SubmissionKind::Files(read_files(files).await?))
        }
    };

    // Only submitting runs reconcile abandoned work.
    let recovered = coordinator.recover()?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "marked interrupted submissions as failed");
    }

    if config.token.is_empty() {
        bail!(
            "no access token configured; set `token` in the config file or {}",
            crate::config::TOKEN_ENV
        );
    }

    let events = coordinator
        .take_events()
        .context("event stream already taken")?;
    let handle = coordinator.submit(request)?;
    tracing::info!(id = %handle.id(), "submission started");

    let snapshot = follow(&handle, events).await?;
    print_json(&snapshot)?;

    match snapshot.status {
        UploadStatus::Completed => Ok(()),
        UploadStatus::Cancelled => bail!("submission {} cancelled", snapshot.id),
        _ => match &snapshot.error {
            Some(error) => bail!("submission {} failed: {error}", snapshot.id),
            None => bail!("submission {} failed", snapshot.id),
        },
    }
}

fn request(target: Target, kind: SubmissionKind) -> SubmissionRequest {
    SubmissionRequest {
        assignment: AssignmentRef::new(target.course, target.assignment),
        kind,
        comment: target.comment,
    }
}

async fn read_files(paths: Vec<PathBuf>) -> anyhow::Result<Vec<FileSource>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let source = FileSource::from_path(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(source);
    }
    Ok(files)
}

fn show_status(coordinator: &UploadCoordinator, id: Option<String>) -> anyhow::Result<()> {
    match id {
        Some(id) => {
            let id: SubmissionId = id.parse().context("invalid submission id")?;
            print_json(&coordinator.status(id)?)
        }
        None => {
            for snapshot in coordinator.list()? {
                println!("{}", status_line(&snapshot));
            }
            Ok(())
        }
    }
}

/// Reports events until the submission is terminal. Ctrl-C cancels it.
async fn follow(
    handle: &SubmissionHandle,
    mut events: mpsc::Receiver<SubmitEvent>,
) -> anyhow::Result<SubmissionSnapshot> {
    let mut reporter = ProgressReporter::default();
    let wait = handle.wait();
    tokio::pin!(wait);

    loop {
        tokio::select! {
            result = &mut wait => return Ok(result?),
            Some(event) = events.recv() => {
                if let Some(line) = reporter.observe(handle, &event) {
                    eprintln!("{line}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupt received, cancelling submission");
                handle.cancel();
            }
        }
    }
}

/// Turns submission events into human-readable progress lines.
#[derive(Default)]
struct ProgressReporter {
    meters: HashMap<TaskId, RateMeter>,
}

impl ProgressReporter {
    fn observe(
        &mut self,
        handle: &SubmissionHandle,
        event: &SubmitEvent,
    ) -> Option<String> {
        let name = |task_id: TaskId| {
            handle
                .snapshot()
                .aggregate
                .task(task_id)
                .map(|t| t.file_name().to_string())
                .unwrap_or_else(|| task_id.to_string())
        };

        match event {
            SubmitEvent::FileProgress {
                task_id,
                bytes_sent,
                bytes_total,
                ..
            } => {
                let meter = self.meters.entry(*task_id).or_default();
                meter.observe(*bytes_sent);
                let progress = TransferProgress {
                    bytes_sent: *bytes_sent,
                    bytes_total: *bytes_total,
                };
                Some(progress_line(
                    &name(*task_id),
                    progress,
                    meter.bytes_per_second(),
                    meter.eta(bytes_total - bytes_sent),
                ))
            }
            SubmitEvent::FileCompleted { task_id, file, .. } => {
                self.meters.remove(task_id);
                Some(format!("{}: uploaded as file {}", name(*task_id), file.id))
            }
            SubmitEvent::FileFailed { task_id, error, .. } => {
                self.meters.remove(task_id);
                Some(format!("{}: failed ({error})", name(*task_id)))
            }
            SubmitEvent::StatusChanged { status, .. } => Some(format!("status: {status:?}")),
            SubmitEvent::Completed { .. }
            | SubmitEvent::Failed { .. }
            | SubmitEvent::Cancelled { .. } => None,
        }
    }
}

fn progress_line(
    name: &str,
    progress: TransferProgress,
    rate: f64,
    eta: Option<Duration>,
) -> String {
    let mut line = match progress.percentage() {
        Some(pct) => format!(
            "{name}: {pct:.0}% ({} of {})",
            format_bytes(progress.bytes_sent),
            format_bytes(progress.bytes_total)
        ),
        None => format!("{name}: {}", format_bytes(progress.bytes_sent)),
    };
    if rate > 0.0 {
        line.push_str(&format!(", {}/s", format_bytes(rate as i64)));
    }
    if let Some(eta) = eta {
        line.push_str(&format!(", {}s left", eta.as_secs()));
    }
    line
}

fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn status_line(snapshot: &SubmissionSnapshot) -> String {
    let kind = match &snapshot.payload {
        SubmissionPayload::Text { .. } => "text".to_string(),
        SubmissionPayload::Url { .. } => "url".to_string(),
        SubmissionPayload::Files => {
            format!("{} file(s)", snapshot.aggregate.len())
        }
    };
    let mut line = format!(
        "{}  {:<11}  course {} assignment {}  {kind}  {}",
        snapshot.id,
        format!("{:?}", snapshot.status),
        snapshot.assignment.course_id,
        snapshot.assignment.assignment_id,
        snapshot.updated_at.format("%Y-%m-%d %H:%M:%S"),
    );
    if let Some(error) = &snapshot.error {
        line.push_str(&format!("  ({error})"));
    }
    line
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursework_submit::{FileUploadAggregate, SubmissionStore};

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(-1), "-1 B");
    }

    #[test]
    fn progress_line_known_total() {
        let line = progress_line(
            "essay.pdf",
            TransferProgress {
                bytes_sent: 512,
                bytes_total: 1024,
            },
            256.0,
            Some(Duration::from_secs(2)),
        );
        assert_eq!(line, "essay.pdf: 50% (512 B of 1.0 KiB), 256 B/s, 2s left");
    }

    #[test]
    fn progress_line_unknown_total() {
        let line = progress_line(
            "essay.pdf",
            TransferProgress {
                bytes_sent: 100,
                bytes_total: -1,
            },
            0.0,
            None,
        );
        assert_eq!(line, "essay.pdf: 100 B");
    }

    #[test]
    fn status_line_mentions_error() {
        let mut snapshot = SubmissionSnapshot::new(
            SubmissionId::new(),
            AssignmentRef::new("10", "20"),
            SubmissionPayload::Files,
            None,
            FileUploadAggregate::default(),
        );
        snapshot.mark_interrupted();
        let line = status_line(&snapshot);
        assert!(line.contains("Failed"));
        assert!(line.contains("course 10 assignment 20"));
        assert!(line.contains("0 file(s)"));
        assert!(line.contains("interrupted"));
    }

    #[tokio::test]
    async fn status_leaves_unfinished_submissions_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("submissions")).unwrap();
        let mut snapshot = SubmissionSnapshot::new(
            SubmissionId::new(),
            AssignmentRef::new("10", "20"),
            SubmissionPayload::Text { body: "draft".into() },
            None,
            FileUploadAggregate::default(),
        );
        snapshot.status = UploadStatus::InProgress;
        store.save(&snapshot).unwrap();

        let config = Config {
            staging_dir: dir.path().join("staging"),
            store_dir: dir.path().join("submissions"),
            ..Config::default()
        };
        run(config.clone(), Command::Status { id: None }).await.unwrap();
        run(
            config,
            Command::Status {
                id: Some(snapshot.id.to_string()),
            },
        )
        .await
        .unwrap();

        let stored = store.load(snapshot.id).unwrap().unwrap();
        assert_eq!(stored.status, UploadStatus::InProgress);
        assert!(stored.error.is_none());
    }
}
