//! GitHub contents API backend for docstore.
//!
//! Reads and conditionally writes one JSON file in a repository branch. The
//! blob SHA returned by the API is the integrity token; GitHub rejects a
//! `PUT` whose `sha` no longer matches the file, which is surfaced as
//! `StoreError::Conflict`.

mod codec;
mod config;
mod contents;

pub use codec::{decode_document, encode_document};
pub use config::GithubConfig;
pub use contents::GithubContentsStore;
