use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::TransferError;

/// Boundary token shared by every multipart body this process produces.
pub const MULTIPART_BOUNDARY: &str =
    "---------------------------3klfenalksjflkjoi9auf89eshajsnl3kjnwal";

/// Form field name the upload destination expects the file bytes under.
const FILE_FIELD: &str = "file";

/// Value for the `Content-Type` header of an encoded body.
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}")
}

/// Serializes `data` and the scalar form `params` into a multipart/form-data
/// body.
///
/// Fields are emitted in key order, followed by the file part and the closing
/// boundary. The same inputs always produce the same bytes.
pub fn encode_multipart_body(
    data: &[u8],
    params: &BTreeMap<String, serde_json::Value>,
) -> Result<Vec<u8>, TransferError> {
    debug_assert!(MULTIPART_BOUNDARY.is_ascii());

    let delim = format!("--{MULTIPART_BOUNDARY}\r\n");
    let mut body = Vec::with_capacity(data.len() + 256 * (params.len() + 1));

    for (key, value) in params {
        let name = field_name(key)?;
        let value = field_value(key, value)?;
        body.extend_from_slice(delim.as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(delim.as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{FILE_FIELD}\"\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Ok(body)
}

fn field_name(key: &str) -> Result<&str, TransferError> {
    if key.is_empty() || key.contains(['"', '\r', '\n']) {
        return Err(TransferError::Encoding(format!(
            "invalid form field name {key:?}"
        )));
    }
    Ok(key)
}

fn field_value<'a>(key: &str, value: &'a serde_json::Value) -> Result<Cow<'a, str>, TransferError> {
    use serde_json::Value;

    match value {
        Value::String(s) => Ok(Cow::Borrowed(s)),
        Value::Number(n) => Ok(Cow::Owned(n.to_string())),
        Value::Bool(b) => Ok(Cow::Owned(b.to_string())),
        Value::Null => Ok(Cow::Borrowed("")),
        Value::Array(_) | Value::Object(_) => Err(TransferError::Encoding(format!(
            "form field {key:?} is not a scalar"
        ))),
    }
}
