use octocrab::Error as OctocrabError;
use thiserror::Error;

use crate::error::SentinelError;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub token not found: {0}")]
    TokenNotFound(String),
    #[error("GitHub configuration missing: {0}")]
    ConfigNotFound(String),
    #[error("GitHub API error: {0}")]
    ApiError(#[from] OctocrabError),
    #[error("GitHub operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },
}

impl GitHubError {
    /// Short troubleshooting hint for the CLI, keyed on the HTTP status.
    pub fn hint(&self) -> &'static str {
        match self {
            GitHubError::TokenNotFound(_) => {
                "Set MERGE_SENTINEL__GITHUB__TOKEN or GITHUB_TOKEN (needs 'repo' scope for private repos)"
            }
            GitHubError::ConfigNotFound(_) => {
                "Set github.owner and github.repo in merge-sentinel.toml or MERGE_SENTINEL__GITHUB__OWNER/REPO"
            }
            GitHubError::ApiError(octocrab::Error::GitHub { source, .. }) => {
                match source.status_code.as_u16() {
                    401 => "Token is invalid or expired",
                    403 => "Token lacks required permissions or the rate limit was hit",
                    404 => "Repository or pull request not found; check owner/repo settings",
                    _ => "Check GitHub status: https://www.githubstatus.com",
                }
            }
            GitHubError::ApiError(_) => "Network connection to the GitHub API failed",
            GitHubError::Timeout { .. } => "Check network connectivity or raise github.request_timeout_secs",
        }
    }
}

// Every adapter failure collapses into one kind at the library seam.
impl From<GitHubError> for SentinelError {
    fn from(err: GitHubError) -> Self {
        SentinelError::remote(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_remote_unavailable() {
        let err = GitHubError::Timeout {
            operation: "get_pull_request".to_string(),
            duration_ms: 10_000,
        };
        let sentinel: SentinelError = err.into();
        match sentinel {
            SentinelError::RemoteUnavailable { message } => {
                assert!(message.contains("get_pull_request"));
                assert!(message.contains("10000ms"));
            }
            other => panic!("expected RemoteUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_token_hint() {
        let err = GitHubError::TokenNotFound("missing".to_string());
        assert!(err.hint().contains("GITHUB_TOKEN"));
    }
}
