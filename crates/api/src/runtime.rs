//! HTTP implementation of the transfer runtime.
//!
//! Each started transfer streams its staged multipart body to the upload
//! URL on a spawned task and reports progress and completion through the
//! runtime's event channel. The upload host is contacted without the API
//! token; a redirect to the confirmation endpoint is followed with the
//! authenticated [`Client`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use coursework_protocol::{FileRecord, UNKNOWN_TOTAL};
use coursework_transfer::{
    TaskId, TransferError, TransferEvent, TransferEventSender, TransferRequest, TransferRuntime,
};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, Error};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

type Inflight = Arc<Mutex<HashMap<TaskId, CancellationToken>>>;

/// Uploads staged bodies over HTTP.
pub struct HttpTransferRuntime {
    http: reqwest::Client,
    api: Client,
    events: TransferEventSender,
    inflight: Inflight,
}

impl HttpTransferRuntime {
    /// Creates a runtime that reports into `events` and confirms uploads
    /// through `api`.
    pub fn new(api: Client, events: TransferEventSender) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api,
            events,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Number of transfers currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }
}

fn lock(
    inflight: &Inflight,
) -> std::sync::MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransferRuntime for HttpTransferRuntime {
    fn start(&self, request: TransferRequest) -> Result<(), TransferError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let task_id = request.task_id;
        let token = CancellationToken::new();
        {
            let mut inflight = lock(&self.inflight);
            if inflight.contains_key(&task_id) {
                return Err(TransferError::RequestEncoding(format!(
                    "transfer {task_id} already started"
                )));
            }
            inflight.insert(task_id, token.clone());
        }

        let http = self.http.clone();
        let api = self.api.clone();
        let events = self.events.clone();
        let inflight = self.inflight.clone();

        handle.spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(TransferError::Cancelled),
                r = upload(&http, &api, &events, &request) => r,
            };

            lock(&inflight).remove(&task_id);
            if let Err(e) = request.body.remove() {
                warn!(task = %task_id, error = %e, "failed to remove staged body");
            }

            match &result {
                Ok(file) => info!(task = %task_id, file_id = %file.id, "transfer completed"),
                Err(e) => warn!(task = %task_id, error = %e, "transfer failed"),
            }

            if events
                .send(TransferEvent::Finished { task_id, result })
                .await
                .is_err()
            {
                debug!(task = %task_id, "transfer events receiver dropped");
            }
        });

        Ok(())
    }

    fn cancel(&self, task_id: TaskId) {
        if let Some(token) = lock(&self.inflight).get(&task_id) {
            debug!(task = %task_id, "cancelling transfer");
            token.cancel();
        }
    }
}

async fn upload(
    http: &reqwest::Client,
    api: &Client,
    events: &TransferEventSender,
    request: &TransferRequest,
) -> Result<FileRecord, TransferError> {
    let task_id = request.task_id;
    let staged = request.body.clone();
    tokio::task::spawn_blocking(move || staged.verify())
        .await
        .map_err(|e| TransferError::Transport(e.to_string()))??;

    let total = request.body.len();
    let file = tokio::fs::File::open(request.body.path()).await?;

    let progress_tx = events.clone();
    let mut sent: i64 = 0;
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as i64;
            // Progress is advisory; a full channel drops the update.
            let _ = progress_tx.try_send(TransferEvent::Progress {
                task_id,
                bytes_sent: sent,
                bytes_total: i64::try_from(total).unwrap_or(UNKNOWN_TOTAL),
            });
        }
        chunk
    });

    debug!(task = %task_id, url = %request.url, bytes = total, "starting upload");
    let resp = http
        .post(&request.url)
        .header(CONTENT_TYPE, &request.content_type)
        .header(CONTENT_LENGTH, total)
        .body(reqwest::Body::wrap_stream(stream))
        .send()
        .await
        .map_err(|e| TransferError::Transport(e.to_string()))?;

    let status = resp.status();
    if status.is_redirection() {
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::Remote {
                status: status.as_u16(),
                body: "redirect without location".into(),
            })?
            .to_string();
        debug!(task = %task_id, %location, "confirming upload");
        return Ok(api.confirm_upload(&location).await?);
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransferError::Remote {
            status: status.as_u16(),
            body,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| TransferError::Transport(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| TransferError::Decoding(e.to_string()))
}
