use std::time::Duration;

use docstore_core::StoreError;

/// Location and credentials of the stored document.
///
/// Built once at startup and handed to `GithubContentsStore::new`.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API base URL, e.g. `https://api.github.com`
    pub api_url: String,
    /// Personal access token with contents read/write permission
    pub token: String,
    /// Repository as `owner/name`
    pub repo: String,
    pub branch: String,
    /// Path of the JSON file inside the repository
    pub file_path: String,
    /// Message used for every commit
    pub commit_message: String,
    /// Per-request timeout for the remote host
    pub timeout: Duration,
}

impl GithubConfig {
    pub const DEFAULT_API_URL: &'static str = "https://api.github.com";
    pub const DEFAULT_BRANCH: &'static str = "main";
    pub const DEFAULT_FILE_PATH: &'static str = "public/data.json";
    pub const DEFAULT_COMMIT_MESSAGE: &'static str = "Update data.json from admin panel";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Config with default API URL, branch, file path, message and timeout.
    pub fn new(token: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
            token: token.into(),
            repo: repo.into(),
            branch: Self::DEFAULT_BRANCH.to_string(),
            file_path: Self::DEFAULT_FILE_PATH.to_string(),
            commit_message: Self::DEFAULT_COMMIT_MESSAGE.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Reject configs that could never reach the document.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.token.trim().is_empty() {
            return Err(StoreError::Config("GITHUB_TOKEN is not set".to_string()));
        }

        match self.repo.trim().split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(StoreError::Config(format!(
                    "GITHUB_REPO must be in owner/name form, got {:?}",
                    self.repo
                )));
            }
        }

        if self.branch.trim().is_empty() {
            return Err(StoreError::Config("GITHUB_BRANCH is empty".to_string()));
        }

        if self.file_path.trim().is_empty() || self.file_path.starts_with('/') {
            return Err(StoreError::Config(format!(
                "File path must be relative to the repository root, got {:?}",
                self.file_path
            )));
        }

        if self.timeout.is_zero() {
            return Err(StoreError::Config("Remote timeout must be positive".to_string()));
        }

        Ok(())
    }
}
