//! Outbound relays: image upload to a public file host, and transaction
//! message links.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{ApiError, Result};

/// Local time offset used in transaction messages (UTC+7).
const MESSAGE_UTC_OFFSET_HOURS: i64 = 7;

/// Signature line closing every transaction message.
pub const DEFAULT_MESSAGE_FOOTER: &str = "`©️ RAYY SETTING 7 - RS7`";

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Forwards uploaded files to the file host and returns their public URL.
pub struct UploadRelay {
    client: Client,
    upload_url: String,
}

impl UploadRelay {
    pub fn new(upload_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("docstore/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Relay(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, upload_url })
    }

    /// Upload a file; the host answers with the public URL as plain text.
    #[instrument(skip(self, file), fields(file_name = %file.file_name, size = file.data.len()))]
    pub async fn upload(&self, file: UploadedFile) -> Result<String> {
        let mut part = Part::bytes(file.data).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part
                .mime_str(content_type)
                .map_err(|e| ApiError::BadRequest(format!("Invalid content type: {}", e)))?;
        }

        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Relay(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Relay(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Relay(format!(
                "File host returned {}: {}",
                status,
                body.trim()
            )));
        }

        let url = body.trim();
        if !url.starts_with("http") {
            return Err(ApiError::Relay(format!("Unexpected file host reply: {}", url)));
        }

        debug!("Uploaded to {}", url);
        Ok(url.to_string())
    }
}

/// Details of a purchase reported through `/api.php`.
#[derive(Debug, Clone, Default)]
pub struct TransactionNotice {
    pub item_name: String,
    pub item_price: String,
    pub receipt_url: String,
    pub website_url: String,
}

/// Builds `wa.me` links carrying a pre-filled transaction message.
pub struct MessageLinkBuilder {
    number: String,
    footer: Option<String>,
}

impl MessageLinkBuilder {
    pub fn new(number: String, footer: Option<String>) -> Self {
        Self {
            number: number.chars().filter(char::is_ascii_digit).collect(),
            footer: footer.filter(|f| !f.trim().is_empty()),
        }
    }

    pub fn message(&self, notice: &TransactionNotice, at: DateTime<Utc>) -> String {
        let local = at.naive_utc() + chrono::Duration::hours(MESSAGE_UTC_OFFSET_HOURS);

        let mut message = String::from("*NEW TRANSACTION RECEIVED*\n\n");
        message.push_str(&format!("*ITEM TYPE : {}*\n", notice.item_name));
        message.push_str(&format!("*PRICE : {}*\n", notice.item_price));
        message.push_str(&format!("*RECEIPT : {}*\n", notice.receipt_url));
        message.push_str(&format!("*TIME : {}*\n", local.format("%H.%M.%S")));
        message.push_str(&format!("*DATE : {}*\n", local.format("%-d/%-m/%Y")));
        message.push_str(&format!("*WEBSITE : {}*\n", notice.website_url));
        if let Some(footer) = &self.footer {
            message.push('\n');
            message.push_str(footer);
        }
        message
    }

    pub fn link(&self, notice: &TransactionNotice, at: DateTime<Utc>) -> String {
        format!(
            "https://wa.me/{}?text={}",
            self.number,
            urlencoding::encode(&self.message(notice, at))
        )
    }
}

pub type SharedUploadRelay = Arc<UploadRelay>;
pub type SharedMessageLinkBuilder = Arc<MessageLinkBuilder>;
