use thiserror::Error;

/// Errors that can occur while reading or writing the document.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network failure, timeout, rate limit or server error on the remote host.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored bytes are not transport-encoded JSON.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The integrity token supplied on commit no longer matches the stored version.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Neither the remote store nor the fallback snapshot could be read.
    #[error("Document unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether a failed fetch may be served from the fallback snapshot.
    pub fn is_recoverable_on_read(&self) -> bool {
        matches!(self, StoreError::RemoteUnavailable(_) | StoreError::Decode(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
