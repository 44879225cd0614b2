use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::operations::{MergeEngine, MergeOutcome};
use crate::error::SentinelError;
use crate::retry::Deadline;
use crate::types::{ConflictSet, ConflictedFile};

const REMOTE: &str = "origin";

/// Where a repository's reusable working copy lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Lock key, e.g. `owner/repo`
    pub key: String,
    pub remote_url: String,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub repository: RepositoryRef,
    pub pull_request_id: u64,
    pub base_branch: String,
    pub head_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "conflict_set", rename_all = "snake_case")]
pub enum ProbeOutcome {
    NoConflict,
    Conflicts(ConflictSet),
}

#[async_trait]
pub trait MergeProbe: Send + Sync {
    async fn probe(
        &self,
        request: &ProbeRequest,
        deadline: Deadline,
    ) -> Result<ProbeOutcome, SentinelError>;
}

/// Runs real merges in a reused working copy, one probe per repository at a
/// time.
///
/// The engine is blocking, so each probe runs on the blocking pool. The
/// repository's lock guard moves into that task: a probe that outlives its
/// timeout keeps the working copy locked until the engine returns.
pub struct LocalMergeProber {
    engine: Arc<dyn MergeEngine>,
    timeout: Duration,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LocalMergeProber {
    pub fn new(engine: Arc<dyn MergeEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl MergeProbe for LocalMergeProber {
    async fn probe(
        &self,
        request: &ProbeRequest,
        deadline: Deadline,
    ) -> Result<ProbeOutcome, SentinelError> {
        let budget = deadline.bound(self.timeout);
        if budget.is_zero() {
            return Err(SentinelError::probe("no time left for a local merge probe"));
        }
        let probe_deadline = Deadline::after(budget);

        let lock = self.lock_for(&request.repository.key);
        let guard = tokio::time::timeout(probe_deadline.remaining(), lock.lock_owned())
            .await
            .map_err(|_| {
                SentinelError::probe(format!(
                    "timed out waiting for the working copy of {}",
                    request.repository.key
                ))
            })?;

        let engine = Arc::clone(&self.engine);
        let task_request = request.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            run_probe(engine.as_ref(), &task_request)
        });

        match tokio::time::timeout(probe_deadline.remaining(), task).await {
            Ok(Ok(Ok(outcome))) => {
                match &outcome {
                    ProbeOutcome::NoConflict => {
                        info!(pr = request.pull_request_id, "Local merge is clean")
                    }
                    ProbeOutcome::Conflicts(set) => info!(
                        pr = request.pull_request_id,
                        files = set.len(),
                        "Local merge has conflicts"
                    ),
                }
                Ok(outcome)
            }
            Ok(Ok(Err(e))) => {
                warn!(pr = request.pull_request_id, error = %format!("{e:#}"), "Local merge probe failed");
                Err(SentinelError::probe(format!("{e:#}")))
            }
            Ok(Err(join_error)) => Err(SentinelError::probe(format!(
                "merge engine task failed: {join_error}"
            ))),
            Err(_) => {
                warn!(
                    pr = request.pull_request_id,
                    budget_ms = budget.as_millis() as u64,
                    "Local merge probe timed out"
                );
                Err(SentinelError::probe(format!(
                    "probe timed out after {}ms",
                    budget.as_millis()
                )))
            }
        }
    }
}

/// Aborts whatever merge is in progress when dropped, whether the probe
/// returned normally, failed or panicked.
struct MergeStateGuard<'a> {
    engine: &'a dyn MergeEngine,
    workdir: &'a Path,
}

impl Drop for MergeStateGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.engine.abort_merge(self.workdir) {
            warn!(workdir = %self.workdir.display(), error = %e, "Failed to abort merge state");
        }
    }
}

fn run_probe(engine: &dyn MergeEngine, request: &ProbeRequest) -> Result<ProbeOutcome> {
    let workdir = request.repository.workdir.as_path();

    // Advisory lock shared with other processes using the same working copy
    let lock_path = workdir.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
    let mut file_lock = fd_lock::RwLock::new(lock_file);
    let _file_guard = file_lock
        .write()
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

    if engine.is_cloned(workdir) {
        // Reconcile leftovers from an interrupted run
        engine.abort_merge(workdir)?;
    } else {
        debug!(remote = %request.repository.remote_url, "Cloning working copy");
        engine.clone_repo(&request.repository.remote_url, workdir)?;
    }

    let _merge_guard = MergeStateGuard { engine, workdir };

    let base = format!("{REMOTE}/{}", request.base_branch);
    let head = format!("{REMOTE}/{}", request.head_branch);

    engine.fetch(workdir, REMOTE)?;
    engine.checkout(workdir, &request.base_branch, &base)?;
    engine.reset_hard(workdir, &base)?;

    match engine.merge(workdir, &head)? {
        MergeOutcome::Clean => Ok(ProbeOutcome::NoConflict),
        MergeOutcome::Conflicted => {
            let files = engine
                .list_unmerged(workdir)?
                .into_iter()
                .map(|unmerged| ConflictedFile::new(unmerged.path, unmerged.change_kind))
                .collect();
            Ok(ProbeOutcome::Conflicts(ConflictSet::new(
                request.pull_request_id,
                files,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::UnmergedPath;
    use crate::types::ChangeKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// In-memory engine that records each call and tracks merge state.
    #[derive(Default)]
    struct FakeEngine {
        calls: StdMutex<Vec<String>>,
        cloned: AtomicBool,
        merging: AtomicBool,
        conflicts: Vec<UnmergedPath>,
        fail_fetch: bool,
        panic_on_merge: bool,
        merge_delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl FakeEngine {
        fn conflicting(paths: &[&str]) -> Self {
            Self {
                conflicts: paths
                    .iter()
                    .map(|path| UnmergedPath {
                        path: path.to_string(),
                        change_kind: ChangeKind::Modified,
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn is_merging(&self) -> bool {
            self.merging.load(Ordering::SeqCst)
        }
    }

    impl MergeEngine for FakeEngine {
        fn is_cloned(&self, _workdir: &Path) -> bool {
            self.cloned.load(Ordering::SeqCst)
        }

        fn clone_repo(&self, _remote_url: &str, _workdir: &Path) -> Result<()> {
            self.record("clone");
            self.cloned.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn fetch(&self, _workdir: &Path, remote: &str) -> Result<()> {
            self.record(&format!("fetch {remote}"));
            if self.fail_fetch {
                anyhow::bail!("network unreachable");
            }
            Ok(())
        }

        fn checkout(&self, _workdir: &Path, branch: &str, start_point: &str) -> Result<()> {
            self.record(&format!("checkout {branch} {start_point}"));
            Ok(())
        }

        fn reset_hard(&self, _workdir: &Path, target: &str) -> Result<()> {
            self.record(&format!("reset {target}"));
            Ok(())
        }

        fn merge(&self, _workdir: &Path, other: &str) -> Result<MergeOutcome> {
            self.record(&format!("merge {other}"));
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.merging.store(true, Ordering::SeqCst);
            if !self.merge_delay.is_zero() {
                std::thread::sleep(self.merge_delay);
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.panic_on_merge {
                panic!("engine crashed");
            }
            if self.conflicts.is_empty() {
                Ok(MergeOutcome::Clean)
            } else {
                Ok(MergeOutcome::Conflicted)
            }
        }

        fn list_unmerged(&self, _workdir: &Path) -> Result<Vec<UnmergedPath>> {
            self.record("list_unmerged");
            Ok(self.conflicts.clone())
        }

        fn abort_merge(&self, _workdir: &Path) -> Result<()> {
            self.record("abort");
            self.merging.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn request(workdir: &TempDir) -> ProbeRequest {
        ProbeRequest {
            repository: RepositoryRef {
                key: "octo/widgets".to_string(),
                remote_url: "https://example.invalid/octo/widgets.git".to_string(),
                workdir: workdir.path().join("worktree"),
            },
            pull_request_id: 42,
            base_branch: "main".to_string(),
            head_branch: "feature".to_string(),
        }
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_first_probe_clones_and_reports_conflicts() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::conflicting(&["src/lib.rs", "README.md"]));
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let outcome = prober.probe(&request(&dir), deadline()).await.unwrap();

        let ProbeOutcome::Conflicts(set) = outcome else {
            panic!("expected conflicts");
        };
        assert_eq!(set.pull_request_id, 42);
        assert_eq!(set.paths().collect::<Vec<_>>(), vec!["README.md", "src/lib.rs"]);
        assert_eq!(
            engine.calls(),
            vec![
                "clone",
                "fetch origin",
                "checkout main origin/main",
                "reset origin/main",
                "merge origin/feature",
                "list_unmerged",
                "abort",
            ]
        );
        assert!(!engine.is_merging());
    }

    #[tokio::test]
    async fn test_repeated_probe_reuses_clone_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::conflicting(&["a.txt"]));
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let first = prober.probe(&request(&dir), deadline()).await.unwrap();
        let second = prober.probe(&request(&dir), deadline()).await.unwrap();

        assert_eq!(first, second);
        let calls = engine.calls();
        assert_eq!(calls.iter().filter(|call| *call == "clone").count(), 1);
        // Second run reconciles before fetching
        let second_run = &calls[calls.len() - 7..];
        assert_eq!(second_run[0], "abort");
        assert_eq!(second_run[1], "fetch origin");
        assert!(!engine.is_merging());
    }

    #[tokio::test]
    async fn test_clean_merge_is_no_conflict() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let outcome = prober.probe(&request(&dir), deadline()).await.unwrap();

        assert_eq!(outcome, ProbeOutcome::NoConflict);
        assert!(!engine.calls().contains(&"list_unmerged".to_string()));
        assert!(!engine.is_merging());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_probe_unavailable() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine {
            fail_fetch: true,
            ..FakeEngine::default()
        });
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let err = prober.probe(&request(&dir), deadline()).await.unwrap_err();

        assert!(matches!(err, SentinelError::ProbeUnavailable { .. }));
        assert!(err.to_string().contains("network unreachable"));
        assert_eq!(engine.calls().last().map(String::as_str), Some("abort"));
    }

    #[tokio::test]
    async fn test_engine_panic_still_aborts_merge() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine {
            conflicts: vec![UnmergedPath {
                path: "a.txt".to_string(),
                change_kind: ChangeKind::Modified,
            }],
            panic_on_merge: true,
            ..FakeEngine::default()
        });
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let err = prober.probe(&request(&dir), deadline()).await.unwrap_err();

        assert!(matches!(err, SentinelError::ProbeUnavailable { .. }));
        assert!(!engine.is_merging());
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine {
            merge_delay: Duration::from_millis(300),
            ..FakeEngine::default()
        });
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_millis(50));

        let err = prober.probe(&request(&dir), deadline()).await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_engine() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));

        let err = prober
            .probe(&request(&dir), Deadline::after(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(err, SentinelError::ProbeUnavailable { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_probes_of_one_repository_are_serialized() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine {
            merge_delay: Duration::from_millis(50),
            ..FakeEngine::default()
        });
        let prober = LocalMergeProber::new(engine.clone(), Duration::from_secs(30));
        let request = request(&dir);

        let (first, second) = tokio::join!(
            prober.probe(&request, deadline()),
            prober.probe(&request, deadline())
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
    }
}
