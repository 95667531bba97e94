use async_trait::async_trait;
use docstore_core::{Document, IntegrityToken, RemoteStore, StoreError, VersionedDocument};
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::codec::{decode_document, encode_document};
use crate::config::GithubConfig;

const API_VERSION: &str = "2022-11-28";
const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// `GET /repos/{repo}/contents/{path}` response (file variant).
#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// `GET /repos/{repo}/git/blobs/{sha}` response.
#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

/// `PUT /repos/{repo}/contents/{path}` request body.
#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: Option<ContentRef>,
}

#[derive(Deserialize)]
struct ContentRef {
    sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Fetch,
    Commit,
}

/// Remote store backed by one file in a GitHub repository.
///
/// The file's blob SHA is the integrity token. Every request carries the
/// configured token; one `reqwest::Client` is reused so connections are pooled.
#[derive(Clone)]
pub struct GithubContentsStore {
    http_client: HttpClient,
    config: GithubConfig,
}

impl std::fmt::Debug for GithubContentsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubContentsStore")
            .field("api_url", &self.config.api_url)
            .field("repo", &self.config.repo)
            .field("branch", &self.config.branch)
            .field("file_path", &self.config.file_path)
            .finish_non_exhaustive()
    }
}

impl GithubContentsStore {
    /// Create a new store. Fails fast on an unusable config.
    pub fn new(config: GithubConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let http_client = HttpClient::builder()
            .user_agent(concat!("docstore/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn api_base(&self) -> &str {
        self.config.api_url.trim_end_matches('/')
    }

    /// URL of the contents endpoint, with each path segment percent-encoded.
    fn contents_url(&self) -> String {
        let path = self
            .config
            .file_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base(),
            self.config.repo.trim(),
            path
        )
    }

    fn blob_url(&self, sha: &str) -> String {
        format!(
            "{}/repos/{}/git/blobs/{}",
            self.api_base(),
            self.config.repo.trim(),
            sha
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, op: Operation, request: RequestBuilder) -> Result<String, StoreError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::RemoteUnavailable(format!("GitHub request timed out: {}", e))
            } else {
                StoreError::RemoteUnavailable(format!("GitHub request failed: {}", e))
            }
        })?;

        let status = response.status();
        let rate_limited = is_rate_limited(response.headers());
        let body = response.text().await.map_err(|e| {
            StoreError::RemoteUnavailable(format!("Failed to read GitHub response: {}", e))
        })?;

        if !status.is_success() {
            return Err(classify_failure(op, status, rate_limited, &body));
        }

        Ok(body)
    }

    /// Fetch content too large for the contents endpoint through the blobs API.
    async fn fetch_blob(&self, sha: &str) -> Result<Document, StoreError> {
        let body = self
            .send(Operation::Fetch, self.http_client.get(self.blob_url(sha)))
            .await?;

        let blob: BlobResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::Decode(format!("Unexpected blob response: {}", e)))?;

        match blob.encoding.as_deref() {
            Some("base64") | None => decode_document(&blob.content),
            Some(other) => Err(StoreError::Decode(format!(
                "Unsupported blob encoding: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for GithubContentsStore {
    fn backend_name(&self) -> &'static str {
        "github"
    }

    #[instrument(skip(self), level = "debug", fields(repo = %self.config.repo, path = %self.config.file_path))]
    async fn fetch(&self) -> Result<VersionedDocument, StoreError> {
        let request = self
            .http_client
            .get(self.contents_url())
            .query(&[("ref", self.config.branch.as_str())]);
        let body = self.send(Operation::Fetch, request).await?;

        let contents: ContentsResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::Decode(format!("Unexpected contents response: {}", e)))?;

        let document = match contents.encoding.as_deref() {
            Some("base64") => decode_document(&contents.content)?,
            // Files above 1 MB come back without inline content
            Some("none") | None if contents.content.is_empty() => {
                debug!("Content not inlined, fetching blob {}", contents.sha);
                self.fetch_blob(&contents.sha).await?
            }
            None => decode_document(&contents.content)?,
            Some(other) => {
                return Err(StoreError::Decode(format!(
                    "Unsupported content encoding: {}",
                    other
                )));
            }
        };

        debug!("Fetched {} at {}", self.config.file_path, contents.sha);
        Ok(VersionedDocument {
            document,
            token: IntegrityToken::new(contents.sha),
        })
    }

    #[instrument(skip(self, document), level = "debug", fields(repo = %self.config.repo, path = %self.config.file_path))]
    async fn commit(
        &self,
        document: &Document,
        token: &IntegrityToken,
    ) -> Result<IntegrityToken, StoreError> {
        let body = PutContentsRequest {
            message: &self.config.commit_message,
            content: encode_document(document)?,
            sha: token.as_str(),
            branch: &self.config.branch,
        };

        let request = self.http_client.put(self.contents_url()).json(&body);
        let response = self.send(Operation::Commit, request).await?;

        let put: PutContentsResponse = serde_json::from_str(&response)
            .map_err(|e| StoreError::Decode(format!("Unexpected commit response: {}", e)))?;
        let new_sha = put
            .content
            .map(|c| c.sha)
            .ok_or_else(|| StoreError::Decode("Commit response has no content sha".to_string()))?;

        debug!("Committed {} {} -> {}", self.config.file_path, token, new_sha);
        Ok(IntegrityToken::new(new_sha))
    }
}

fn is_rate_limited(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Map a non-success status to the error taxonomy.
///
/// Rejected credentials on fetch count as unavailability so readers can be
/// served from the fallback snapshot; on commit they are reported as `Auth`.
fn classify_failure(op: Operation, status: StatusCode, rate_limited: bool, body: &str) -> StoreError {
    let detail = format!("GitHub returned {}: {}", status, truncate(body, 300));

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN
            && (rate_limited || body.to_ascii_lowercase().contains("rate limit")))
    {
        warn!("GitHub rate limit hit during {:?}", op);
        return StoreError::RemoteUnavailable(detail);
    }

    match (op, status) {
        (_, StatusCode::NOT_FOUND) => StoreError::NotFound(detail),
        (Operation::Fetch, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            StoreError::RemoteUnavailable(detail)
        }
        (Operation::Commit, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            StoreError::Auth(detail)
        }
        (Operation::Commit, StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED) => {
            StoreError::Conflict(detail)
        }
        (Operation::Commit, StatusCode::UNPROCESSABLE_ENTITY)
            if body.to_ascii_lowercase().contains("sha") =>
        {
            StoreError::Conflict(detail)
        }
        _ => StoreError::RemoteUnavailable(detail),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
