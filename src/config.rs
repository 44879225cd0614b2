use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::git::RepositoryRef;

/// Main configuration structure for Merge Sentinel
///
/// Built once at startup and handed to each component; nothing reads
/// configuration from ambient state after that.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// GitHub configuration
    pub github: GitHubConfig,
    /// Mergeability polling policy
    pub resolver: ResolverConfig,
    /// Local working copy used for merge probes
    pub prober: ProberConfig,
    /// Conflict knowledge index settings
    pub index: IndexConfig,
    /// Batch ingestion of merged pull requests
    pub ingestion: IngestionConfig,
    /// Per-event processing limits
    pub pipeline: PipelineConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token (can be set via env var)
    pub token: Option<String>,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// API root override, for GitHub Enterprise or a mock server
    pub api_base_url: Option<String>,
    /// Upper bound on a single API call
    pub request_timeout_secs: u64,
    /// Client-side request rate
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None, // Read from env var when unset
            owner: String::new(),
            repo: String::new(),
            api_base_url: None,
            request_timeout_secs: 10,
            requests_per_second: 5,
            burst_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum number of mergeability queries per event
    pub max_attempts: u32,
    /// Delay between queries
    pub delay_ms: u64,
    /// Multiplier applied to the delay after each attempt (1.0 keeps it fixed)
    pub backoff_factor: f64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
    /// Randomize each delay within [delay/2, delay]
    pub jitter: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            delay_ms: 2000,
            backoff_factor: 1.0,
            max_delay_ms: 10_000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProberConfig {
    /// Where the reusable clone lives
    pub workdir: PathBuf,
    /// Clone URL; derived from owner/repo when unset
    pub remote_url: Option<String>,
    /// Upper bound on one probe, including waiting for the working copy lock
    pub timeout_secs: u64,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(".merge-sentinel/worktree"),
            remote_url: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    /// SQLite file holding the conflict vectors
    pub path: PathBuf,
    /// Embedding dimensionality
    pub dims: usize,
    /// Matches returned per query when no k is given
    pub top_k: usize,
    /// Hard upper bound on k
    pub max_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".merge-sentinel/conflicts.db"),
            dims: 384,
            top_k: 3,
            max_k: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Pull requests requested per page (GitHub caps this at 100)
    pub page_size: u8,
    /// Stop after this many merged pull requests
    pub max_pull_requests: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pull_requests: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Overall bound on handling one event; every stage waits within it
    pub event_deadline_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            event_deadline_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit structured JSON logs instead of compact text
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl SentinelConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or merge-sentinel.toml when present)
    /// 3. Environment variables (prefixed with MERGE_SENTINEL__)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new("merge-sentinel.toml").exists() {
                    builder = builder.add_source(File::with_name("merge-sentinel"));
                }
            }
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("MERGE_SENTINEL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to read configuration")?;

        let mut sentinel_config: SentinelConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;

        // Special handling for GitHub token - check multiple sources
        if sentinel_config.github.token.is_none() {
            sentinel_config.github.token = std::env::var("GITHUB_TOKEN")
                .or_else(|_| std::env::var("API_KEY"))
                .ok()
                .filter(|token| !token.is_empty());
        }

        Ok(sentinel_config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Clone URL for the local working copy.
    pub fn remote_url(&self) -> String {
        self.prober.remote_url.clone().unwrap_or_else(|| {
            format!(
                "https://github.com/{}/{}.git",
                self.github.owner, self.github.repo
            )
        })
    }

    pub fn repository_ref(&self) -> RepositoryRef {
        RepositoryRef {
            key: format!("{}/{}", self.github.owner, self.github.repo),
            remote_url: self.remote_url(),
            workdir: self.prober.workdir.clone(),
        }
    }

    /// Render as TOML with the token masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.github.token.is_some() {
            redacted.github.token = Some("********".to_string());
        }
        Ok(toml::to_string_pretty(&redacted)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_polling_policy() {
        let config = SentinelConfig::default();
        assert_eq!(config.resolver.max_attempts, 7);
        assert_eq!(config.resolver.delay_ms, 2000);
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.ingestion.page_size, 50);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[github]\nowner = \"octo\"\nrepo = \"widgets\"\n\n[resolver]\nmax_attempts = 3"
        )
        .unwrap();

        let config = SentinelConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.github.owner, "octo");
        assert_eq!(config.resolver.max_attempts, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.resolver.delay_ms, 2000);
        assert_eq!(config.remote_url(), "https://github.com/octo/widgets.git");
        assert_eq!(config.repository_ref().key, "octo/widgets");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[observability]\nlog_level = \"warn\"\njson_logs = false").unwrap();

        // No other test reads observability settings
        std::env::set_var("MERGE_SENTINEL__OBSERVABILITY__JSON_LOGS", "true");
        let config = SentinelConfig::load(Some(file.path()));
        std::env::remove_var("MERGE_SENTINEL__OBSERVABILITY__JSON_LOGS");

        let config = config.unwrap();
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_redacted_toml_hides_token() {
        let mut config = SentinelConfig::default();
        config.github.token = Some("ghp_secret".to_string());

        let rendered = config.to_redacted_toml().unwrap();
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("********"));
    }
}
