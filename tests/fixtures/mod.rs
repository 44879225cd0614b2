#![allow(dead_code)]
//! Mock collaborators for pipeline scenario tests - no side effects

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use merge_sentinel::{
    ChangeKind, ConflictEventPipeline, ConflictLookup, ConflictSet, ConflictedFile, Deadline,
    DiffSource, MergeProbe, MergeabilityCheck, MergeabilityReport, MergeabilityStatus,
    PipelineSettings, ProbeOutcome, ProbeRequest, RepositoryRef, SentinelError, SimilarConflict,
    VectorId,
};
use merge_sentinel::github::{ChangedFile, MergedPullRequestPage, PullRequestMergeability};

/// Resolver that returns a fixed answer and counts calls
pub struct MockResolver {
    pub answer: Result<MergeabilityStatus, SentinelError>,
    pub calls: AtomicUsize,
}

impl MockResolver {
    pub fn returning(status: MergeabilityStatus) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(status),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(error: SentinelError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MergeabilityCheck for MockResolver {
    async fn resolve(
        &self,
        _pull_request_id: u64,
        _deadline: Deadline,
    ) -> Result<MergeabilityReport, SentinelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .clone()
            .map(|status| MergeabilityReport::new(status, Utc::now(), 1))
    }
}

/// Prober with a fixed outcome that records each request
pub struct MockProber {
    pub answer: Result<ProbeOutcome, SentinelError>,
    pub requests: Mutex<Vec<ProbeRequest>>,
}

impl MockProber {
    pub fn conflicts(pull_request_id: u64, paths: &[&str]) -> Arc<Self> {
        let files = paths
            .iter()
            .map(|path| ConflictedFile::new(*path, ChangeKind::Modified))
            .collect();
        Self::with(Ok(ProbeOutcome::Conflicts(ConflictSet::new(
            pull_request_id,
            files,
        ))))
    }

    pub fn clean() -> Arc<Self> {
        Self::with(Ok(ProbeOutcome::NoConflict))
    }

    pub fn unavailable() -> Arc<Self> {
        Self::with(Err(SentinelError::probe("clone failed: connection refused")))
    }

    fn with(answer: Result<ProbeOutcome, SentinelError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProbeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MergeProbe for MockProber {
    async fn probe(
        &self,
        request: &ProbeRequest,
        _deadline: Deadline,
    ) -> Result<ProbeOutcome, SentinelError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone()
    }
}

/// Knowledge index stand-in returning the same matches for every query
pub struct MockLookup {
    pub answer: Result<Vec<SimilarConflict>, SentinelError>,
    pub queries: Mutex<Vec<(String, Option<usize>)>>,
}

impl MockLookup {
    pub fn matching(matches: Vec<SimilarConflict>) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(matches),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            answer: Err(SentinelError::index("database is locked")),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<(String, Option<usize>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConflictLookup for MockLookup {
    async fn similar_conflicts(
        &self,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SimilarConflict>, SentinelError> {
        self.queries.lock().unwrap().push((text.to_string(), k));
        self.answer.clone()
    }
}

/// Diff source serving canned file lists
#[derive(Default)]
pub struct MockDiffSource {
    pub files: HashMap<u64, Vec<ChangedFile>>,
    pub file_calls: AtomicUsize,
}

impl MockDiffSource {
    pub fn with_files(pull_request_id: u64, files: Vec<ChangedFile>) -> Arc<Self> {
        Arc::new(Self {
            files: HashMap::from([(pull_request_id, files)]),
            file_calls: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn file_calls(&self) -> usize {
        self.file_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiffSource for MockDiffSource {
    async fn get_pull_request(
        &self,
        _pull_request_id: u64,
    ) -> Result<PullRequestMergeability, SentinelError> {
        Ok(PullRequestMergeability::default())
    }

    async fn get_pull_request_files(
        &self,
        pull_request_id: u64,
    ) -> Result<Vec<ChangedFile>, SentinelError> {
        self.file_calls.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(&pull_request_id)
            .cloned()
            .ok_or_else(|| SentinelError::remote("404 Not Found"))
    }

    async fn list_merged_pull_requests(
        &self,
        _page_size: u8,
        _page: u32,
    ) -> Result<MergedPullRequestPage, SentinelError> {
        Ok(MergedPullRequestPage::default())
    }
}

pub fn repository() -> RepositoryRef {
    RepositoryRef {
        key: "octo/widgets".to_string(),
        remote_url: "https://github.com/octo/widgets.git".to_string(),
        workdir: PathBuf::from("/tmp/merge-sentinel-test/worktree"),
    }
}

pub fn similar(pull_request_id: u64, path: &str, score: f32) -> SimilarConflict {
    SimilarConflict {
        id: VectorId::new(pull_request_id, path),
        score,
        merged_at: Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap(),
    }
}

/// Collaborators of one pipeline, kept so tests can inspect the mocks
pub struct Harness {
    pub resolver: Arc<MockResolver>,
    pub prober: Arc<MockProber>,
    pub lookup: Arc<MockLookup>,
    pub source: Arc<MockDiffSource>,
}

impl Harness {
    pub fn pipeline(&self) -> ConflictEventPipeline {
        ConflictEventPipeline::new(
            self.resolver.clone(),
            self.prober.clone(),
            self.lookup.clone(),
            self.source.clone(),
            repository(),
            PipelineSettings {
                event_deadline: Duration::from_secs(30),
                top_k: 3,
            },
        )
    }
}
