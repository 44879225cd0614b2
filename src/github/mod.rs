pub mod client;
pub mod errors;
pub mod types;

pub use client::{DiffSource, GitHubClient};
pub use errors::GitHubError;
pub use types::{
    ChangedFile, MergedPullRequest, MergedPullRequestPage, PullRequestMergeability,
    RemoteFileStatus, RemoteMergeableState,
};
