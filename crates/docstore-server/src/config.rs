use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use docstore_core::RetryPolicy;
use docstore_github::GithubConfig;

use crate::relay::DEFAULT_MESSAGE_FOOTER;

/// Configuration for the docstore server.
#[derive(Parser, Debug, Clone)]
#[command(name = "docstore-server")]
#[command(about = "View and overwrite a JSON document stored in a GitHub repository")]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to bind to
    #[arg(long, default_value = "3000", env = "PORT")]
    pub port: u16,

    /// GitHub token with contents read/write permission
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Repository holding the document (owner/name)
    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: String,

    /// Branch the document is read from and committed to
    #[arg(long, default_value = GithubConfig::DEFAULT_BRANCH, env = "GITHUB_BRANCH")]
    pub github_branch: String,

    /// GitHub API base URL
    #[arg(long, default_value = GithubConfig::DEFAULT_API_URL, env = "GITHUB_API_URL")]
    pub github_api_url: String,

    /// Path of the document inside the repository
    #[arg(long, default_value = GithubConfig::DEFAULT_FILE_PATH, env = "DATA_FILE_PATH")]
    pub data_file_path: String,

    /// Commit message used on save
    #[arg(long, default_value = GithubConfig::DEFAULT_COMMIT_MESSAGE, env = "COMMIT_MESSAGE")]
    pub commit_message: String,

    /// Timeout for each request to GitHub
    #[arg(long, default_value = "15", env = "REMOTE_TIMEOUT_SECS")]
    pub remote_timeout_secs: u64,

    /// Local snapshot served when GitHub cannot be read
    #[arg(long, default_value = "public/data.json", env = "FALLBACK_PATH")]
    pub fallback_path: PathBuf,

    /// Disable the local fallback snapshot
    #[arg(long, env = "NO_FALLBACK")]
    pub no_fallback: bool,

    /// Directory with index.html, admin.html and other static assets
    #[arg(long, default_value = "public", env = "STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Admin password checked by /api/login
    #[arg(long, default_value = "admin123", env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,

    /// Require a login session token on /api/save
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "SAVE_REQUIRES_AUTH")]
    pub save_requires_auth: bool,

    /// Lifetime of admin session tokens
    #[arg(long, default_value = "86400", env = "SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Attempts per save when GitHub reports a conflict (1 = no retry)
    #[arg(long, default_value = "1", env = "SAVE_RETRY_ATTEMPTS")]
    pub save_retry_attempts: u32,

    /// Destination number for transaction messages
    #[arg(long, default_value = "601173686870", env = "WHATSAPP_NUMBER")]
    pub whatsapp_number: String,

    /// File host endpoint for image uploads
    #[arg(long, default_value = "https://catbox.moe/user/api.php", env = "UPLOAD_URL")]
    pub upload_url: String,

    /// Last line appended to transaction messages; blank disables it
    #[arg(long, default_value = DEFAULT_MESSAGE_FOOTER, env = "MESSAGE_FOOTER")]
    pub message_footer: String,
}

impl Config {
    /// Get the GitHub store config.
    pub fn github_config(&self) -> GithubConfig {
        GithubConfig {
            api_url: self.github_api_url.clone(),
            token: self.github_token.clone(),
            repo: self.github_repo.clone(),
            branch: self.github_branch.clone(),
            file_path: self.data_file_path.clone(),
            commit_message: self.commit_message.clone(),
            timeout: Duration::from_secs(self.remote_timeout_secs),
        }
    }

    /// Get the effective fallback snapshot path, if enabled.
    pub fn effective_fallback_path(&self) -> Option<PathBuf> {
        (!self.no_fallback).then(|| self.fallback_path.clone())
    }

    pub fn save_retry_policy(&self) -> RetryPolicy {
        if self.save_retry_attempts <= 1 {
            RetryPolicy::none()
        } else {
            RetryPolicy::exponential(
                self.save_retry_attempts,
                Duration::from_millis(200),
                Duration::from_secs(3),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["docstore-server", "--github-token", "t", "--github-repo", "o/r"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(config.save_requires_auth);
        assert_eq!(config.save_retry_policy(), RetryPolicy::none());
        assert_eq!(
            config.effective_fallback_path(),
            Some(PathBuf::from("public/data.json"))
        );

        let github = config.github_config();
        assert_eq!(github.branch, "main");
        assert_eq!(github.file_path, "public/data.json");
        assert_eq!(github.timeout, Duration::from_secs(15));
        assert_eq!(config.message_footer, "`©️ RAYY SETTING 7 - RS7`");
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--save-requires-auth",
            "false",
            "--no-fallback",
            "--save-retry-attempts",
            "4",
            "--github-branch",
            "master",
        ]);
        assert!(!config.save_requires_auth);
        assert_eq!(config.effective_fallback_path(), None);
        assert_eq!(config.save_retry_policy().max_attempts, 4);
        assert_eq!(config.github_config().branch, "master");
    }

    #[test]
    fn test_store_credentials_are_required() {
        let result = Config::try_parse_from(["docstore-server", "--github-token", "t"]);
        assert!(result.is_err());
    }
}
