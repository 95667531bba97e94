//! Admin password check and session tokens.
//!
//! `/api/login` trades the admin password for an opaque session token held in
//! a moka cache; `/api/save` requires that token as a Bearer credential unless
//! the gate is disabled in config.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ApiError, Result};

/// Session token prefix.
const TOKEN_PREFIX: &str = "dss_";

pub struct AdminAuth {
    password_digest: String,
    sessions: Cache<String, ()>,
    save_requires_auth: bool,
}

impl AdminAuth {
    pub fn new(password: &str, session_ttl_secs: u64, save_requires_auth: bool) -> Self {
        let sessions = Cache::builder()
            .time_to_live(Duration::from_secs(session_ttl_secs))
            .max_capacity(1_000)
            .build();

        Self {
            password_digest: hash(password),
            sessions,
            save_requires_auth,
        }
    }

    pub fn save_requires_auth(&self) -> bool {
        self.save_requires_auth
    }

    /// Check the password and open a session.
    pub async fn login(&self, password: &str) -> Result<String> {
        // Compare fixed-length digests, never the raw strings
        if hash(password) != self.password_digest {
            return Err(ApiError::InvalidPassword);
        }

        let token = format!("{}{}", TOKEN_PREFIX, uuid::Uuid::new_v4().simple());
        self.sessions.insert(hash(&token), ()).await;
        debug!("Opened admin session {}...", &token[..12]);
        Ok(token)
    }

    /// Validate a session token.
    pub async fn validate(&self, token: &str) -> Result<()> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(ApiError::Unauthorized);
        }
        match self.sessions.get(&hash(token)).await {
            Some(()) => Ok(()),
            None => Err(ApiError::Unauthorized),
        }
    }

    /// Gate for write endpoints.
    pub async fn authorize_save(&self, headers: &HeaderMap) -> Result<()> {
        if !self.save_requires_auth {
            return Ok(());
        }
        let token = extract_bearer_token(headers).ok_or(ApiError::Unauthorized)?;
        self.validate(token).await
    }
}

/// Extract Bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Hash a secret using SHA-256.
fn hash(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shared auth wrapped in Arc.
pub type SharedAdminAuth = Arc<AdminAuth>;
