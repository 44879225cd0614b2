use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ChangeKind, ConflictedFile, MergeabilityStatus};

/// GitHub's coarse `mergeable_state` classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteMergeableState {
    Clean,
    Dirty,
    Unknown,
    Blocked,
    Behind,
    Unstable,
    HasHooks,
    Draft,
    Other(String),
}

impl RemoteMergeableState {
    pub fn parse(state: &str) -> Self {
        match state {
            "clean" => Self::Clean,
            "dirty" => Self::Dirty,
            "unknown" => Self::Unknown,
            "blocked" => Self::Blocked,
            "behind" => Self::Behind,
            "unstable" => Self::Unstable,
            "has_hooks" => Self::HasHooks,
            "draft" => Self::Draft,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Mergeability fields of a pull request as last computed by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullRequestMergeability {
    /// `None` while GitHub is still computing
    pub mergeable: Option<bool>,
    pub mergeable_state: Option<RemoteMergeableState>,
}

impl PullRequestMergeability {
    pub fn status(&self) -> MergeabilityStatus {
        match (self.mergeable, &self.mergeable_state) {
            (None, _) => MergeabilityStatus::Unknown,
            (Some(false), _) => MergeabilityStatus::Conflicting,
            (Some(true), Some(RemoteMergeableState::Dirty)) => MergeabilityStatus::Conflicting,
            (Some(true), Some(RemoteMergeableState::Unknown)) => MergeabilityStatus::Unknown,
            (Some(true), _) => MergeabilityStatus::Mergeable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    /// A status this adapter does not know; never a conflict candidate
    Other,
}

impl RemoteFileStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "added" => Self::Added,
            "removed" => Self::Removed,
            "renamed" => Self::Renamed,
            "copied" => Self::Copied,
            "unchanged" => Self::Unchanged,
            "changed" => Self::Changed,
            "modified" => Self::Modified,
            other => {
                debug!(status = other, "Unrecognized file status from GitHub");
                Self::Other
            }
        }
    }

    pub fn change_kind(self) -> ChangeKind {
        match self {
            Self::Added | Self::Copied => ChangeKind::Added,
            Self::Removed => ChangeKind::Removed,
            Self::Renamed => ChangeKind::Renamed,
            Self::Modified | Self::Changed | Self::Unchanged | Self::Other => ChangeKind::Modified,
        }
    }
}

/// One entry of a pull request's file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub status: RemoteFileStatus,
    pub patch: Option<String>,
    pub previous_filename: Option<String>,
}

impl ChangedFile {
    pub fn new(filename: impl Into<String>, status: RemoteFileStatus, patch: Option<&str>) -> Self {
        Self {
            filename: filename.into(),
            status,
            patch: patch.map(str::to_string),
            previous_filename: None,
        }
    }

    /// Statuses that can collide with base-branch edits. Added files are left
    /// out, which makes this an over-approximation of real conflicts only in
    /// one direction.
    pub fn is_conflict_candidate(&self) -> bool {
        matches!(
            self.status,
            RemoteFileStatus::Modified | RemoteFileStatus::Renamed | RemoteFileStatus::Removed
        )
    }

    pub fn to_conflicted_file(&self) -> ConflictedFile {
        ConflictedFile::new(self.filename.clone(), self.status.change_kind())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPullRequest {
    pub id: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub merged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedPullRequestPage {
    pub items: Vec<MergedPullRequest>,
    /// Page number to request next, if the listing continues
    pub next_page: Option<u32>,
}
