use anyhow::{Context, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, ObjectType, RemoteCallbacks, Repository, ResetType};
use std::path::Path;

use crate::types::ChangeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Clean,
    Conflicted,
}

/// A path left unmerged in the index after a conflicted merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmergedPath {
    pub path: String,
    pub change_kind: ChangeKind,
}

/// Capability interface for the local merge engine used by the prober
///
/// Every operation addresses a working copy by path, so one engine serves any
/// number of repositories.
pub trait MergeEngine: Send + Sync {
    /// Whether `workdir` already holds a usable clone
    fn is_cloned(&self, workdir: &Path) -> bool;

    /// Clone `remote_url` into `workdir` (replaces `git clone`)
    fn clone_repo(&self, remote_url: &str, workdir: &Path) -> Result<()>;

    /// Fetch all branches from a remote (replaces `git fetch`)
    fn fetch(&self, workdir: &Path, remote: &str) -> Result<()>;

    /// Point local `branch` at `start_point` and check it out (replaces `git checkout -B`)
    fn checkout(&self, workdir: &Path, branch: &str, start_point: &str) -> Result<()>;

    /// Hard-reset HEAD, index and working tree (replaces `git reset --hard`)
    fn reset_hard(&self, workdir: &Path, target: &str) -> Result<()>;

    /// Merge `other` into HEAD without committing (replaces `git merge --no-commit`)
    fn merge(&self, workdir: &Path, other: &str) -> Result<MergeOutcome>;

    /// Paths left in a conflicted state (replaces `git diff --name-only --diff-filter=U`)
    fn list_unmerged(&self, workdir: &Path) -> Result<Vec<UnmergedPath>>;

    /// Drop any in-progress merge and restore HEAD (replaces `git merge --abort`)
    fn abort_merge(&self, workdir: &Path) -> Result<()>;
}

/// Implementation of MergeEngine using git2
#[derive(Debug, Clone, Default)]
pub struct Git2MergeEngine {
    token: Option<String>,
}

impl Git2MergeEngine {
    pub fn new() -> Self {
        Self { token: None }
    }

    /// Authenticate HTTPS fetches with a GitHub token.
    pub fn with_token(token: Option<String>) -> Self {
        Self { token }
    }

    fn open(workdir: &Path) -> Result<Repository> {
        Repository::open(workdir)
            .with_context(|| format!("Failed to open working copy at {}", workdir.display()))
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(token) = self.token.clone() {
            callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
                Cred::userpass_plaintext("x-access-token", &token)
            });
        }

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        fetch_options
    }
}

impl MergeEngine for Git2MergeEngine {
    fn is_cloned(&self, workdir: &Path) -> bool {
        Repository::open(workdir).is_ok()
    }

    fn clone_repo(&self, remote_url: &str, workdir: &Path) -> Result<()> {
        if let Some(parent) = workdir.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(self.fetch_options());
        builder
            .clone(remote_url, workdir)
            .with_context(|| format!("Failed to clone {remote_url}"))?;

        Ok(())
    }

    fn fetch(&self, workdir: &Path, remote_name: &str) -> Result<()> {
        let repo = Self::open(workdir)?;
        let mut remote = repo
            .find_remote(remote_name)
            .with_context(|| format!("Remote '{remote_name}' not found"))?;

        let refspec = format!("+refs/heads/*:refs/remotes/{remote_name}/*");
        remote
            .fetch(&[refspec.as_str()], Some(&mut self.fetch_options()), None)
            .with_context(|| format!("Failed to fetch from '{remote_name}'"))?;

        Ok(())
    }

    fn checkout(&self, workdir: &Path, branch: &str, start_point: &str) -> Result<()> {
        let repo = Self::open(workdir)?;
        let target = repo
            .revparse_single(start_point)
            .with_context(|| format!("Branch '{start_point}' not found"))?
            .peel_to_commit()?;

        let refname = format!("refs/heads/{branch}");
        let is_current = repo
            .head()
            .ok()
            .and_then(|head| head.name().map(|name| name == refname))
            .unwrap_or(false);

        // The checked-out branch cannot be force-moved; reset_hard moves it
        if !is_current {
            repo.branch(branch, &target, true)
                .with_context(|| format!("Failed to create branch '{branch}'"))?;
        }

        repo.set_head(&refname)?;
        repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

        Ok(())
    }

    fn reset_hard(&self, workdir: &Path, target: &str) -> Result<()> {
        let repo = Self::open(workdir)?;
        let object = repo
            .revparse_single(target)
            .with_context(|| format!("Reset target '{target}' not found"))?;

        repo.reset(
            &object,
            ResetType::Hard,
            Some(CheckoutBuilder::new().force().remove_untracked(true)),
        )
        .with_context(|| format!("Failed to reset to '{target}'"))?;

        Ok(())
    }

    fn merge(&self, workdir: &Path, other: &str) -> Result<MergeOutcome> {
        let repo = Self::open(workdir)?;
        let other_commit = repo
            .revparse_single(other)
            .with_context(|| format!("Branch '{other}' not found"))?
            .peel_to_commit()?;
        let annotated = repo.find_annotated_commit(other_commit.id())?;

        let (analysis, _preference) = repo.merge_analysis(&[&annotated])?;
        if analysis.is_up_to_date() || analysis.is_fast_forward() {
            return Ok(MergeOutcome::Clean);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.allow_conflicts(true).conflict_style_merge(true);
        repo.merge(&[&annotated], None, Some(&mut checkout))
            .with_context(|| format!("Merge of '{other}' failed"))?;

        let index = repo.index()?;
        if index.has_conflicts() {
            Ok(MergeOutcome::Conflicted)
        } else {
            Ok(MergeOutcome::Clean)
        }
    }

    fn list_unmerged(&self, workdir: &Path) -> Result<Vec<UnmergedPath>> {
        let repo = Self::open(workdir)?;
        let index = repo.index()?;

        let mut unmerged = Vec::new();
        for conflict in index.conflicts()? {
            let conflict = conflict?;

            let path = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(|entry| String::from_utf8_lossy(&entry.path).into_owned());
            let Some(path) = path else {
                continue;
            };

            // Classify from which conflict stages are present
            let change_kind = match (&conflict.ancestor, &conflict.our, &conflict.their) {
                (_, None, _) | (_, _, None) => ChangeKind::Removed,
                (None, Some(_), Some(_)) => ChangeKind::Added,
                _ => ChangeKind::Modified,
            };

            unmerged.push(UnmergedPath { path, change_kind });
        }

        unmerged.sort_by(|a, b| a.path.cmp(&b.path));
        unmerged.dedup_by(|a, b| a.path == b.path);
        Ok(unmerged)
    }

    fn abort_merge(&self, workdir: &Path) -> Result<()> {
        if !self.is_cloned(workdir) {
            return Ok(());
        }

        let repo = Self::open(workdir)?;
        repo.cleanup_state()
            .context("Failed to clear merge state")?;

        // An unborn HEAD has nothing to restore
        if let Ok(head) = repo.head() {
            let head_commit = head.peel(ObjectType::Commit)?;
            repo.reset(
                &head_commit,
                ResetType::Hard,
                Some(CheckoutBuilder::new().force().remove_untracked(true)),
            )
            .context("Failed to reset working copy after merge")?;
        }

        Ok(())
    }
}
