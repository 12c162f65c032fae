use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Total byte count reported before the server has given a definitive length.
pub const UNKNOWN_TOTAL: i64 = -1;

/// Server-issued destination for an out-of-band file transfer.
///
/// Parameters are kept sorted so that multipart encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub upload_url: String,
    pub upload_params: BTreeMap<String, serde_json::Value>,
}

impl UploadTarget {
    /// Parses a resolver response body. Fails when either key is missing.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// A file as described by the remote API after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(with = "id_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
    #[serde(
        rename = "content-type",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub content_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// A submission as acknowledged by the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    #[serde(with = "id_string")]
    pub id: String,
    #[serde(with = "id_string")]
    pub assignment_id: String,
    #[serde(default, with = "opt_id_string", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileRecord>,
}

/// Current state of a file transfer or a submission upload.
///
/// `Pending` doubles as the "created, not yet begun" state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl UploadStatus {
    /// Completed, Failed and Cancelled admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Bytes sent against the expected total for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub bytes_sent: i64,
    pub bytes_total: i64,
}

impl Default for TransferProgress {
    fn default() -> Self {
        Self {
            bytes_sent: 0,
            bytes_total: UNKNOWN_TOTAL,
        }
    }
}

impl TransferProgress {
    /// Returns the progress as a percentage (0-100), or `None` while the
    /// total is unknown.
    pub fn percentage(&self) -> Option<f64> {
        if self.bytes_total < 0 {
            return None;
        }
        if self.bytes_total == 0 {
            return Some(0.0);
        }
        Some(self.bytes_sent as f64 / self.bytes_total as f64 * 100.0)
    }
}

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RequestEncoding,
    Remote,
    Transport,
    Decoding,
    Storage,
    Cancelled,
}

/// A terminal failure attached to a task or submission for later display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RecordedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Remote ids arrive as JSON numbers or strings; both normalize to strings.
mod id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum RawId {
        Number(u64),
        Text(String),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Number(n) => n.to_string(),
                RawId::Text(s) => s,
            }
        }
    }

    pub fn serialize<S: Serializer>(id: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(RawId::deserialize(deserializer)?.into())
    }
}

mod opt_id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::id_string::RawId;

    pub fn serialize<S: Serializer>(id: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => serializer.serialize_some(id),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(Option::<RawId>::deserialize(deserializer)?.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_target_parses_params() {
        let json = br#"{"upload_url":"https://files.example.com/upload","upload_params":{"key":"abc/${filename}","acl":"private","success_action_status":201}}"#;
        let target = UploadTarget::from_slice(json).unwrap();
        assert_eq!(target.upload_url, "https://files.example.com/upload");
        assert_eq!(target.upload_params.len(), 3);
        assert_eq!(target.upload_params["success_action_status"], 201);
    }

    #[test]
    fn upload_target_missing_url_fails() {
        let json = br#"{"upload_params":{}}"#;
        assert!(UploadTarget::from_slice(json).is_err());
    }

    #[test]
    fn upload_target_missing_params_fails() {
        let json = br#"{"upload_url":"https://files.example.com/upload"}"#;
        assert!(UploadTarget::from_slice(json).is_err());
    }

    #[test]
    fn file_record_numeric_id() {
        let json = r#"{"id":5521,"display_name":"essay.pdf","filename":"essay.pdf","content-type":"application/pdf","size":2048}"#;
        let file: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "5521");
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size, 2048);
        assert!(file.url.is_empty());
    }

    #[test]
    fn submission_record_string_ids() {
        let json = r#"{"id":"77","assignment_id":"12","user_id":9,"submission_type":"online_text_entry","body":"Hello"}"#;
        let record: SubmissionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "77");
        assert_eq!(record.assignment_id, "12");
        assert_eq!(record.user_id.as_deref(), Some("9"));
        assert!(record.attachments.is_empty());
    }

    #[test]
    fn submission_record_omits_empty() {
        let record = SubmissionRecord {
            id: "1".into(),
            assignment_id: "2".into(),
            user_id: None,
            submission_type: None,
            body: None,
            url: None,
            attempt: None,
            submitted_at: None,
            workflow_state: None,
            attachments: vec![],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":"1","assignment_id":"2"}"#);
    }

    #[test]
    fn upload_status_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&UploadStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::InProgress.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
        assert!(UploadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn progress_percentage() {
        let p = TransferProgress {
            bytes_sent: 500,
            bytes_total: 1000,
        };
        assert!((p.percentage().unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_percentage_unknown_total() {
        assert!(TransferProgress::default().percentage().is_none());
    }

    #[test]
    fn recorded_error_kind_snake_case() {
        let err = RecordedError::new(ErrorKind::RequestEncoding, "bad params");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"kind":"request_encoding","message":"bad params"}"#);
    }
}
