use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Directive telling the server how to resolve a name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDuplicate {
    Rename,
}

/// Asks the API for an upload destination for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTargetRequest {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_duplicate: Option<OnDuplicate>,
}

impl UploadTargetRequest {
    /// Builds a request. Without `overwrite` the server is told to rename on
    /// conflict instead of failing.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        content_type: Option<String>,
        folder: Option<String>,
        overwrite: bool,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            content_type,
            folder,
            on_duplicate: (!overwrite).then_some(OnDuplicate::Rename),
        }
    }
}

/// Type-specific fields of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "submission_type")]
pub enum SubmissionParams {
    #[serde(rename = "online_text_entry")]
    OnlineTextEntry { body: String },
    #[serde(rename = "online_url")]
    OnlineUrl { url: String },
    #[serde(rename = "online_upload")]
    OnlineUpload { file_ids: Vec<String> },
}

impl SubmissionParams {
    /// The wire discriminant, e.g. `online_upload`.
    pub fn submission_type(&self) -> &'static str {
        match self {
            Self::OnlineTextEntry { .. } => "online_text_entry",
            Self::OnlineUrl { .. } => "online_url",
            Self::OnlineUpload { .. } => "online_upload",
        }
    }
}

/// Body of `POST <course>/assignments/<id>/submissions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubmissionRequest {
    pub submission: SubmissionParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}
