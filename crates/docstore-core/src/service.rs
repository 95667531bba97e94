use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::document::{Document, IntegrityToken};
use crate::error::StoreError;
use crate::fallback::FallbackCache;
use crate::remote::RemoteStore;

/// Bounded optimistic-concurrency retry for the fetch-then-commit sequence.
///
/// Only `StoreError::Conflict` is retried. The default policy makes a single
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no retry.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Read/write access to the document.
///
/// Holds no mutable state: every write re-fetches the integrity token right
/// before committing, and the token is never kept across calls.
#[derive(Clone)]
pub struct DocumentService {
    remote: Arc<dyn RemoteStore>,
    fallback: Option<FallbackCache>,
}

impl DocumentService {
    pub fn new(remote: Arc<dyn RemoteStore>, fallback: Option<FallbackCache>) -> Self {
        Self { remote, fallback }
    }

    pub fn fallback(&self) -> Option<&FallbackCache> {
        self.fallback.as_ref()
    }

    /// Read the current document, falling back to the local snapshot when the
    /// remote store is unreachable or its content cannot be decoded.
    #[instrument(skip(self), level = "debug", fields(backend = self.remote.backend_name()))]
    pub async fn read(&self) -> Result<Document, StoreError> {
        let remote_err = match self.remote.fetch().await {
            Ok(versioned) => {
                debug!("Fetched document at {}", versioned.token);
                self.refresh_fallback(&versioned.document).await;
                return Ok(versioned.document);
            }
            Err(e) if e.is_recoverable_on_read() => e,
            Err(e) => return Err(e),
        };

        warn!("Remote read failed, trying fallback snapshot: {}", remote_err);

        let Some(cache) = &self.fallback else {
            return Err(StoreError::Unavailable(format!(
                "{}; no fallback snapshot configured",
                remote_err
            )));
        };

        match cache.read().await {
            Ok(document) => {
                info!("Serving document from fallback snapshot {}", cache.path().display());
                Ok(document)
            }
            Err(fallback_err) => Err(StoreError::Unavailable(format!(
                "{}; {}",
                remote_err, fallback_err
            ))),
        }
    }

    /// Overwrite the document with `document`.
    ///
    /// Fetches the current token and commits against it. A concurrent writer
    /// that commits in between makes this call fail with `Conflict`; no retry
    /// is attempted.
    #[instrument(skip(self, document), level = "debug", fields(backend = self.remote.backend_name()))]
    pub async fn write(&self, document: &Document) -> Result<(), StoreError> {
        self.write_once(document).await.map(|_| ())
    }

    /// Like `write`, but repeats the fetch-then-commit sequence on `Conflict`
    /// according to `policy`.
    #[instrument(skip(self, document), level = "debug", fields(backend = self.remote.backend_name()))]
    pub async fn write_with_retry(
        &self,
        document: &Document,
        policy: RetryPolicy,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.write_once(document).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        "Write conflict on attempt {}/{}, retrying in {:?}",
                        attempt, policy.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_once(&self, document: &Document) -> Result<IntegrityToken, StoreError> {
        let current = self.remote.fetch().await?;
        let new_token = self.remote.commit(document, &current.token).await?;
        info!("Committed document {} -> {}", current.token, new_token);

        self.refresh_fallback(document).await;
        Ok(new_token)
    }

    /// Best-effort snapshot refresh. Failures are logged, never returned.
    async fn refresh_fallback(&self, document: &Document) {
        if let Some(cache) = &self.fallback {
            if let Err(e) = cache.write(document).await {
                warn!("Failed to refresh fallback snapshot: {}", e);
            }
        }
    }
}
