use async_trait::async_trait;

use crate::document::{Document, IntegrityToken, VersionedDocument};
use crate::error::StoreError;

/// Authenticated read and conditional write of the one stored document.
///
/// Implementations hold no state between calls beyond their connection
/// handles. The integrity token passed to `commit` is the only correctness
/// mechanism: a stale token must fail with `StoreError::Conflict` instead of
/// overwriting a newer version.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the backend identifier (e.g., "github").
    fn backend_name(&self) -> &'static str;

    /// Fetch the current document and the token it is stored at.
    async fn fetch(&self) -> Result<VersionedDocument, StoreError>;

    /// Write `document` if the stored version still matches `token`.
    ///
    /// Returns the token of the newly created version.
    async fn commit(
        &self,
        document: &Document,
        token: &IntegrityToken,
    ) -> Result<IntegrityToken, StoreError>;
}
