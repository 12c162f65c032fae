//! Coursework API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.

use coursework_protocol::{
    CreateSubmissionRequest, ErrorKind, FileRecord, SubmissionRecord, UploadTarget,
    UploadTargetRequest,
};
use coursework_transfer::TransferError;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

/// Characters escaped when an id is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Errors from the coursework API client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request encoding error: {0}")]
    RequestEncoding(String),

    #[error("malformed response ({status}): {message}")]
    MalformedResponse { status: u16, message: String },

    #[error("invalid access token")]
    InvalidToken,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(_) => ErrorKind::Transport,
            Self::Api { .. } | Self::MalformedResponse { .. } => ErrorKind::Remote,
            Self::Json(_) => ErrorKind::Decoding,
            Self::RequestEncoding(_) | Self::InvalidToken => ErrorKind::RequestEncoding,
        }
    }
}

impl From<Error> for TransferError {
    fn from(err: Error) -> Self {
        match err {
            Error::Http(e) => TransferError::Transport(e.to_string()),
            Error::Api { status, body } => TransferError::Remote { status, body },
            Error::MalformedResponse { status, message } => TransferError::Remote {
                status,
                body: message,
            },
            Error::Json(e) => TransferError::Decoding(e.to_string()),
            Error::RequestEncoding(msg) => TransferError::RequestEncoding(msg),
            Error::InvalidToken => TransferError::RequestEncoding("invalid access token".into()),
        }
    }
}

/// Path of the submissions collection for an assignment.
pub fn submissions_path(course_id: &str, assignment_id: &str) -> String {
    format!(
        "/api/v1/courses/{}/assignments/{}/submissions",
        utf8_percent_encode(course_id, PATH_SEGMENT),
        utf8_percent_encode(assignment_id, PATH_SEGMENT)
    )
}

/// Path-scoped API root for files attached to the caller's own submission.
pub fn submission_files_path(course_id: &str, assignment_id: &str) -> String {
    format!("{}/self/files", submissions_path(course_id, assignment_id))
}

/// Coursework API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client for the API at `base_url`, authenticated with `token`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| Error::InvalidToken)?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves `path` against the base URL. Absolute URLs pass through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Sends a built request and returns the body of a successful response.
    async fn execute(&self, request: reqwest::Request) -> Result<(u16, Vec<u8>), Error> {
        let method = request.method().clone();
        let url = request.url().to_string();
        let resp = self.http.execute(request).await?;
        let status = resp.status();
        debug!(%method, %url, status = status.as_u16(), "API response");

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok((status.as_u16(), resp.bytes().await?.to_vec()))
    }

    /// Requests an upload destination for one file.
    ///
    /// `path` is the path-scoped API root, e.g. [`submission_files_path`].
    pub async fn resolve_upload_target(
        &self,
        path: &str,
        request: &UploadTargetRequest,
    ) -> Result<UploadTarget, Error> {
        let req = self
            .http
            .post(self.url(path))
            .form(request)
            .build()
            .map_err(|e| Error::RequestEncoding(e.to_string()))?;

        let (status, body) = self.execute(req).await?;
        UploadTarget::from_slice(&body).map_err(|e| Error::MalformedResponse {
            status,
            message: e.to_string(),
        })
    }

    /// Posts a submission for an assignment and returns the stored record.
    pub async fn create_submission(
        &self,
        course_id: &str,
        assignment_id: &str,
        request: &CreateSubmissionRequest,
    ) -> Result<SubmissionRecord, Error> {
        let req = self
            .http
            .post(self.url(&submissions_path(course_id, assignment_id)))
            .json(request)
            .build()
            .map_err(|e| Error::RequestEncoding(e.to_string()))?;

        let (_, body) = self.execute(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Follows an upload confirmation redirect and returns the file record.
    pub async fn confirm_upload(&self, location: &str) -> Result<FileRecord, Error> {
        let req = self
            .http
            .get(self.url(location))
            .build()
            .map_err(|e| Error::RequestEncoding(e.to_string()))?;

        let (_, body) = self.execute(req).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
