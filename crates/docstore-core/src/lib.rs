//! Core types and protocol for a single JSON document kept in a remote store.
//!
//! This crate defines the pieces shared by every backend and by the HTTP front:
//! - `RemoteStore`: authenticated fetch and conditional commit of the document
//! - `FallbackCache`: on-disk snapshot used when the remote cannot be read
//! - `DocumentService`: fetch-then-commit sequencing and fallback on read

mod document;
mod error;
mod fallback;
mod remote;
mod service;

pub use document::{to_pretty_json, Document, IntegrityToken, VersionedDocument};
pub use error::StoreError;
pub use fallback::FallbackCache;
pub use remote::RemoteStore;
pub use service::{DocumentService, RetryPolicy};
