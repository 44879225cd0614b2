use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mergeability classification produced by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeabilityStatus {
    /// The remote host is still computing; only ever observed mid-poll
    Unknown,
    Mergeable,
    Conflicting,
    /// The remote never answered within the retry budget
    Indeterminate,
}

impl MergeabilityStatus {
    /// Anything short of a definite mergeable answer is verified locally.
    pub fn requires_local_probe(self) -> bool {
        self != Self::Mergeable
    }
}

impl fmt::Display for MergeabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Mergeable => "mergeable",
            Self::Conflicting => "conflicting",
            Self::Indeterminate => "indeterminate",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeabilityReport {
    pub status: MergeabilityStatus,
    pub checked_at: DateTime<Utc>,
    /// Number of remote status queries issued to reach this answer
    pub attempts: u32,
}

impl MergeabilityReport {
    pub fn new(status: MergeabilityStatus, checked_at: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            status,
            checked_at,
            attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Renamed,
    Removed,
    Added,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Modified => "modified",
            Self::Renamed => "renamed",
            Self::Removed => "removed",
            Self::Added => "added",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictedFile {
    pub path: String,
    pub change_kind: ChangeKind,
}

impl ConflictedFile {
    pub fn new(path: impl Into<String>, change_kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            change_kind,
        }
    }
}

/// Files of one pull request that conflict with its base branch.
///
/// Files are kept sorted by path with duplicates removed, so two probes of the
/// same inputs compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSet {
    pub pull_request_id: u64,
    pub files: Vec<ConflictedFile>,
}

impl ConflictSet {
    pub fn new(pull_request_id: u64, mut files: Vec<ConflictedFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup_by(|a, b| a.path == b.path);
        Self {
            pull_request_id,
            files,
        }
    }

    pub fn empty(pull_request_id: u64) -> Self {
        Self::new(pull_request_id, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.path.as_str())
    }
}

/// Which detector produced a conflict set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    /// Exact: unmerged paths from a real three-way merge
    LocalProbe,
    /// Over-approximation from the remote per-file status list
    RemoteHeuristic,
}

/// One changed file of a merged pull request, as stored in the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub source_pull_request_id: u64,
    pub file_path: String,
    pub diff_patch_text: String,
    pub merged_at: DateTime<Utc>,
}

impl ConflictRecord {
    pub fn id(&self) -> VectorId {
        VectorId::new(self.source_pull_request_id, self.file_path.clone())
    }

    /// Text fed to the embedding function.
    pub fn embedding_text(&self) -> String {
        diff_query_text(&self.file_path, Some(&self.diff_patch_text))
    }
}

/// Formats a file path and optional patch the same way ingested records are
/// embedded, so queries and stored vectors share one text layout.
pub fn diff_query_text(path: &str, patch: Option<&str>) -> String {
    match patch {
        Some(patch) if !patch.is_empty() => format!("File: {path}\nDiff: {patch}"),
        _ => format!("File: {path}"),
    }
}

/// Identifier of a stored vector: one per (pull request, file) pair.
///
/// Ordering is by pull request number, then path; this is the tie-break order
/// for equally similar query results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorId {
    pub pull_request_id: u64,
    pub file_path: String,
}

impl VectorId {
    pub fn new(pull_request_id: u64, file_path: impl Into<String>) -> Self {
        Self {
            pull_request_id,
            file_path: file_path.into(),
        }
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pr-{}/{}", self.pull_request_id, self.file_path)
    }
}

/// A ranked historical match returned by the knowledge index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarConflict {
    pub id: VectorId,
    pub score: f32,
    pub merged_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_set_sorted_and_deduplicated() {
        let set = ConflictSet::new(
            5,
            vec![
                ConflictedFile::new("src/z.rs", ChangeKind::Modified),
                ConflictedFile::new("src/a.rs", ChangeKind::Removed),
                ConflictedFile::new("src/z.rs", ChangeKind::Modified),
            ],
        );

        assert_eq!(set.len(), 2);
        assert_eq!(set.paths().collect::<Vec<_>>(), vec!["src/a.rs", "src/z.rs"]);
    }

    #[test]
    fn test_vector_id_order_and_display() {
        let a = VectorId::new(3, "b.rs");
        let b = VectorId::new(3, "c.rs");
        let c = VectorId::new(10, "a.rs");
        assert!(a < b);
        assert!(b < c);
        assert_eq!(c.to_string(), "pr-10/a.rs");
    }

    #[test]
    fn test_embedding_text_layout() {
        let record = ConflictRecord {
            source_pull_request_id: 1,
            file_path: "src/a.py".to_string(),
            diff_patch_text: "@@ -1 +1 @@\n-a\n+b".to_string(),
            merged_at: Utc::now(),
        };
        assert_eq!(
            record.embedding_text(),
            "File: src/a.py\nDiff: @@ -1 +1 @@\n-a\n+b"
        );
        assert_eq!(diff_query_text("src/a.py", None), "File: src/a.py");
        assert_eq!(diff_query_text("src/a.py", Some("")), "File: src/a.py");
    }

    #[test]
    fn test_only_mergeable_skips_probe() {
        assert!(MergeabilityStatus::Conflicting.requires_local_probe());
        assert!(MergeabilityStatus::Indeterminate.requires_local_probe());
        assert!(MergeabilityStatus::Unknown.requires_local_probe());
        assert!(!MergeabilityStatus::Mergeable.requires_local_probe());
    }
}
