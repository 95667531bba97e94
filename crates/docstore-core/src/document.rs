use serde::ser::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::StoreError;

/// The whole application dataset. Never validated, only stored and returned.
pub type Document = serde_json::Value;

/// Opaque identifier of the exact stored version of the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntegrityToken(String);

impl IntegrityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IntegrityToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A document together with the token it was read at.
#[derive(Debug, Clone)]
pub struct VersionedDocument {
    pub document: Document,
    pub token: IntegrityToken,
}

/// Serialize a document the way it is persisted: 4-space indent, trailing newline.
pub fn to_pretty_json(document: &Document) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buf, formatter);
    document
        .serialize(&mut serializer)
        .map_err(|e| StoreError::Io(format!("Failed to serialize document: {}", e)))?;
    buf.push(b'\n');
    Ok(buf)
}
