use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use docstore_core::{to_pretty_json, Document, StoreError};

/// Encode a document for the contents API: pretty JSON, then base64.
pub fn encode_document(document: &Document) -> Result<String, StoreError> {
    Ok(STANDARD.encode(to_pretty_json(document)?))
}

/// Decode a base64 `content` field back into a document.
///
/// GitHub wraps the base64 text every 60 characters, so whitespace is
/// dropped before decoding.
pub fn decode_document(content: &str) -> Result<Document, StoreError> {
    let compact: String = content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| StoreError::Decode(format!("Content is not valid base64: {}", e)))?;

    let text = String::from_utf8(bytes)
        .map_err(|e| StoreError::Decode(format!("Content is not valid UTF-8: {}", e)))?;

    serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .map_err(|e| StoreError::Decode(format!("Content is not valid JSON: {}", e)))
}
