fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    use coursework_protocol::{
        CreateSubmissionRequest, FileRecord, OnDuplicate, SubmissionParams, SubmissionRecord,
        UploadTarget, UploadTargetRequest,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_bytes(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_slice(&load_bytes(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  ours:    {reserialized}"
        );
        parsed
    }

    // --- Responses ---

    #[test]
    fn fixture_upload_target() {
        let target: UploadTarget = roundtrip_test("upload_target.json");
        assert_eq!(target.upload_url, "https://files.example.edu/upload/8f2c");
        let keys: Vec<&str> = target.upload_params.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["Filename", "acl", "content-type", "key", "success_action_redirect"]
        );
    }

    #[test]
    fn upload_target_requires_params() {
        let body = br#"{"upload_url": "https://files.example.edu/upload/8f2c"}"#;
        assert!(UploadTarget::from_slice(body).is_err());
    }

    #[test]
    fn fixture_file_record() {
        let file: FileRecord = roundtrip_test("file_record.json");
        assert_eq!(file.id, "5521");
        assert_eq!(file.content_type, "application/pdf");
    }

    #[test]
    fn fixture_file_record_numeric_id() {
        let file: FileRecord = serde_json::from_value(load_fixture("file_record_numeric_id.json"))
            .expect("numeric ids and extra fields are accepted");
        assert_eq!(file.id, "5521");
        assert_eq!(file.size, 48213);
        assert!(file.url.is_empty());

        let out = serde_json::to_value(&file).unwrap();
        assert_eq!(out["id"], "5521");
        assert!(out.get("folder_id").is_none());
    }

    #[test]
    fn fixture_submission_record() {
        let record: SubmissionRecord = roundtrip_test("submission_record.json");
        assert_eq!(record.submission_type.as_deref(), Some("online_upload"));
        assert_eq!(record.attempt, Some(2));
        assert_eq!(record.attachments.len(), 1);
        assert_eq!(record.attachments[0].id, "5521");
    }

    // --- Requests ---

    #[test]
    fn fixture_upload_target_request() {
        let req: UploadTargetRequest = roundtrip_test("upload_target_request.json");
        assert_eq!(
            req,
            UploadTargetRequest::new(
                "essay.pdf",
                48213,
                Some("application/pdf".into()),
                None,
                false
            )
        );
        assert_eq!(req.on_duplicate, Some(OnDuplicate::Rename));
    }

    #[test]
    fn fixture_create_submission_upload() {
        let req: CreateSubmissionRequest = roundtrip_test("create_submission_upload.json");
        assert_eq!(
            req.submission,
            SubmissionParams::OnlineUpload {
                file_ids: vec!["5521".into(), "5522".into()]
            }
        );
        assert_eq!(req.comment.as_deref(), Some("second attempt"));
    }

    #[test]
    fn fixture_create_submission_text() {
        let req: CreateSubmissionRequest = roundtrip_test("create_submission_text.json");
        assert_eq!(req.submission.submission_type(), "online_text_entry");
        assert!(req.comment.is_none());
    }

    // --- Multipart ---

    #[test]
    fn fixture_multipart_body() {
        let mut params = BTreeMap::new();
        params.insert("key".to_string(), serde_json::json!("uploads/notes.txt"));
        params.insert("size".to_string(), serde_json::json!(5));
        params.insert("Filename".to_string(), serde_json::json!("notes.txt"));

        let body = coursework_transfer::encode_multipart_body(b"hello", &params).unwrap();
        let expected = load_bytes("multipart_body.bin");
        assert_eq!(
            body,
            expected,
            "multipart mismatch:\n  fixture: {}\n  ours:    {}",
            String::from_utf8_lossy(&expected),
            String::from_utf8_lossy(&body)
        );
        assert_eq!(
            coursework_transfer::multipart_content_type(),
            format!(
                "multipart/form-data; boundary={}",
                coursework_transfer::MULTIPART_BOUNDARY
            )
        );
    }
}
