use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use octocrab::{Error as OctocrabError, Octocrab};
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::errors::GitHubError;
use super::types::{
    ChangedFile, MergedPullRequest, MergedPullRequestPage, PullRequestMergeability,
    RemoteFileStatus, RemoteMergeableState,
};
use crate::config::GitHubConfig;
use crate::error::SentinelError;

/// Source of pull-request metadata and diffs
///
/// Every failure, whatever its cause, surfaces as
/// [`SentinelError::RemoteUnavailable`].
#[async_trait]
pub trait DiffSource: Send + Sync {
    async fn get_pull_request(&self, pull_request_id: u64)
        -> Result<PullRequestMergeability, SentinelError>;

    /// All changed files of the pull request, across every page.
    async fn get_pull_request_files(&self, pull_request_id: u64)
        -> Result<Vec<ChangedFile>, SentinelError>;

    /// One page of closed pull requests, keeping only the merged ones.
    async fn list_merged_pull_requests(
        &self,
        page_size: u8,
        page: u32,
    ) -> Result<MergedPullRequestPage, SentinelError>;
}

/// GitHub adapter built on Octocrab with a client-side rate limit and a
/// timeout on every call
pub struct GitHubClient {
    octocrab: Octocrab,
    owner: String,
    repo: String,
    request_timeout: Duration,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let token = config
            .token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                GitHubError::TokenNotFound(
                    "no token in github.token, GITHUB_TOKEN or API_KEY".to_string(),
                )
            })?;

        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::ConfigNotFound(
                "github.owner and github.repo must both be set".to_string(),
            ));
        }

        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(base_url) = &config.api_base_url {
            builder = builder.base_uri(base_url.as_str())?;
        }
        let octocrab = builder.build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_capacity).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(
            Quota::per_second(per_second).allow_burst(burst),
        ));

        Ok(Self {
            octocrab,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            rate_limiter,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Run one API request under the rate limit and the per-call timeout.
    async fn call<T, F>(&self, operation: &str, request: F) -> Result<T, GitHubError>
    where
        F: Future<Output = Result<T, OctocrabError>>,
    {
        self.rate_limiter.until_ready().await;
        debug!(operation, "Executing GitHub API request");

        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result.map_err(GitHubError::from),
            Err(_) => Err(GitHubError::Timeout {
                operation: operation.to_string(),
                duration_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }
}

/// Wire label of a serde-serializable Octocrab enum, e.g. `"dirty"`.
fn wire_label<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(label)) => Some(label),
        _ => None,
    }
}

#[async_trait]
impl DiffSource for GitHubClient {
    async fn get_pull_request(
        &self,
        pull_request_id: u64,
    ) -> Result<PullRequestMergeability, SentinelError> {
        let pr = self
            .call(
                "get_pull_request",
                self.octocrab
                    .pulls(&self.owner, &self.repo)
                    .get(pull_request_id),
            )
            .await?;

        Ok(PullRequestMergeability {
            mergeable: pr.mergeable,
            mergeable_state: pr
                .mergeable_state
                .as_ref()
                .and_then(wire_label)
                .map(|label| RemoteMergeableState::parse(&label)),
        })
    }

    async fn get_pull_request_files(
        &self,
        pull_request_id: u64,
    ) -> Result<Vec<ChangedFile>, SentinelError> {
        let first_page = self
            .call(
                "list_pull_request_files",
                self.octocrab
                    .pulls(&self.owner, &self.repo)
                    .list_files(pull_request_id),
            )
            .await?;
        let entries = self
            .call(
                "list_pull_request_files_pages",
                self.octocrab.all_pages(first_page),
            )
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| ChangedFile {
                status: wire_label(&entry.status)
                    .map(|label| RemoteFileStatus::parse(&label))
                    .unwrap_or(RemoteFileStatus::Other),
                filename: entry.filename,
                patch: entry.patch,
                previous_filename: entry.previous_filename,
            })
            .collect())
    }

    async fn list_merged_pull_requests(
        &self,
        page_size: u8,
        page: u32,
    ) -> Result<MergedPullRequestPage, SentinelError> {
        let listing = self
            .call(
                "list_closed_pull_requests",
                self.octocrab
                    .pulls(&self.owner, &self.repo)
                    .list()
                    .state(octocrab::params::State::Closed)
                    .per_page(page_size.clamp(1, 100))
                    .page(page)
                    .send(),
            )
            .await?;

        let next_page = listing.next.as_ref().map(|_| page + 1);
        let items = listing
            .items
            .into_iter()
            .filter_map(|pr| {
                pr.merged_at.map(|merged_at| MergedPullRequest {
                    id: pr.number,
                    title: pr.title,
                    body: pr.body,
                    merged_at,
                })
            })
            .collect();

        Ok(MergedPullRequestPage { items, next_page })
    }
}
