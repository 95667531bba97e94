use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tracing::{debug, instrument};

use crate::document::{to_pretty_json, Document};
use crate::error::StoreError;

/// Suffix counter so concurrent writers never share a temp file.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk mirror of the last known-good document.
///
/// Only read when the remote store cannot be reached. The snapshot carries no
/// integrity token and is never the basis of a write.
#[derive(Debug, Clone)]
pub struct FallbackCache {
    path: PathBuf,
}

impl FallbackCache {
    /// Create a cache backed by the snapshot file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. Fails with `NotFound` if none has been written.
    #[instrument(skip(self), level = "debug", fields(path = %self.path.display()))]
    pub async fn read(&self) -> Result<Document, StoreError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!(
                    "No fallback snapshot at {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let document = serde_json::from_slice(&data).map_err(|e| {
            StoreError::Decode(format!(
                "Fallback snapshot {} is not valid JSON: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Loaded fallback snapshot ({} bytes)", data.len());
        Ok(document)
    }

    /// Overwrite the snapshot atomically.
    #[instrument(skip(self, document), level = "debug", fields(path = %self.path.display()))]
    pub async fn write(&self, document: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Io(format!("Failed to create dir {}: {}", parent.display(), e))
            })?;
        }

        let data = to_pretty_json(document)?;

        // Write atomically via a temp file private to this call
        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::Io(format!(
                "Failed to write {}: {}",
                temp_path.display(),
                e
            )));
        }
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::Io(format!(
                "Failed to rename to {}: {}",
                self.path.display(),
                e
            )));
        }

        debug!("Saved fallback snapshot ({} bytes)", data.len());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = std::ffi::OsString::from(".");
        if let Some(file_name) = self.path.file_name() {
            name.push(file_name);
        }
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }
}
