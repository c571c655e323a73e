//! # Repository Handles and Branch State
//!
//! This module provides [`RepoHandle`], the interface the rest of the
//! application uses to inspect and move the node branches of the two shared
//! repositories, and [`RepoSet`], which opens both of them from the settings.
//!
//! ## Design
//!
//! All git access goes through the [`GitOperations`] trait. In the main
//! application, [`DefaultGitOperations`] wraps the system `git` binary (see
//! [`crate::git`]). In tests it is replaced with an in-memory commit graph,
//! so that branch states, resets, merge conflicts and pushes can be simulated
//! without touching a real repository.
//!
//! Inspection ([`RepoHandle::branch_state`]) never mutates anything. Mutation
//! ([`RepoHandle::apply`]) moves a branch ref in a single step:
//!
//! - a branch that is not checked out is moved with `git update-ref <new> <old>`,
//!   which fails if the ref changed since it was read;
//! - the checked-out branch is moved with `git reset --hard`, which is refused
//!   while the work tree has uncommitted changes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::config::Settings;
use crate::defaults::{ORIGIN_REMOTE, RECIPES_MAIN_BRANCH, STACK_MAIN_BRANCH};
use crate::error::{Error, Result};
pub use crate::git::MergeOutcome;

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    fn is_work_tree(&self, repo: &Path) -> bool;

    fn remotes(&self, repo: &Path) -> Result<Vec<String>>;

    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<()>;

    /// Fetches a remote, or a single branch of it.
    fn fetch(&self, repo: &Path, remote: &str, branch: Option<&str>) -> Result<()>;

    /// Resolves a ref or revision to a commit id.
    fn resolve(&self, repo: &Path, reference: &str) -> Result<Option<String>>;

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool>;

    /// Returns `(ahead, behind)` of `local` relative to `remote`.
    fn count_divergence(&self, repo: &Path, local: &str, remote: &str) -> Result<(usize, usize)>;

    fn current_branch(&self, repo: &Path) -> Result<Option<String>>;

    fn is_dirty(&self, repo: &Path) -> Result<bool>;

    /// Compare-and-swap of a ref.
    fn update_ref(&self, repo: &Path, reference: &str, new: &str, old: &str) -> Result<()>;

    fn reset_hard(&self, repo: &Path, target: &str) -> Result<()>;

    fn checkout(&self, repo: &Path, target: &str) -> Result<()>;

    fn merge(&self, repo: &Path, revision: &str) -> Result<MergeOutcome>;

    fn merge_abort(&self, repo: &Path) -> Result<()>;

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command.
pub struct DefaultGitOperations;

impl GitOperations for DefaultGitOperations {
    fn is_work_tree(&self, repo: &Path) -> bool {
        crate::git::is_work_tree(repo)
    }

    fn remotes(&self, repo: &Path) -> Result<Vec<String>> {
        crate::git::remotes(repo)
    }

    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<()> {
        crate::git::add_remote(repo, name, url)
    }

    fn fetch(&self, repo: &Path, remote: &str, branch: Option<&str>) -> Result<()> {
        crate::git::fetch(repo, remote, branch)
    }

    fn resolve(&self, repo: &Path, reference: &str) -> Result<Option<String>> {
        crate::git::resolve(repo, reference)
    }

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        crate::git::is_ancestor(repo, ancestor, descendant)
    }

    fn count_divergence(&self, repo: &Path, local: &str, remote: &str) -> Result<(usize, usize)> {
        crate::git::count_divergence(repo, local, remote)
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        crate::git::current_branch(repo)
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool> {
        crate::git::is_dirty(repo)
    }

    fn update_ref(&self, repo: &Path, reference: &str, new: &str, old: &str) -> Result<()> {
        crate::git::update_ref(repo, reference, new, old)
    }

    fn reset_hard(&self, repo: &Path, target: &str) -> Result<()> {
        crate::git::reset_hard(repo, target)
    }

    fn checkout(&self, repo: &Path, target: &str) -> Result<()> {
        crate::git::checkout(repo, target)
    }

    fn merge(&self, repo: &Path, revision: &str) -> Result<MergeOutcome> {
        crate::git::merge(repo, revision)
    }

    fn merge_abort(&self, repo: &Path) -> Result<()> {
        crate::git::merge_abort(repo)
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        crate::git::push(repo, remote, branch)
    }
}

/// Which of the two shared repositories a handle points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    /// The easyconfigs repository holding recipe files.
    Recipes,
    /// The stack-definition repository holding the package list.
    Stack,
}

impl RepoKind {
    pub fn main_branch(&self) -> &'static str {
        match self {
            RepoKind::Recipes => RECIPES_MAIN_BRANCH,
            RepoKind::Stack => STACK_MAIN_BRANCH,
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepoKind::Recipes => "recipe repository",
            RepoKind::Stack => "stack repository",
        })
    }
}

/// State of a local branch compared with its `origin` counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BranchState {
    UpToDate,
    /// Local is an ancestor of remote.
    FastForwardable { behind: usize },
    /// Local has commits remote lacks. `behind` may be zero.
    Diverged { ahead: usize, behind: usize },
    MissingLocal,
    MissingRemote,
}

/// A mutation requested on a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    FastForward,
    HardReset,
    Skip,
}

/// What [`RepoHandle::apply`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Local already pointed at remote.
    Unchanged,
    FastForwarded { from: String, to: String },
    /// Local was moved to remote, dropping `discarded` local-only commits.
    Reset {
        from: String,
        to: String,
        discarded: usize,
    },
    Skipped,
}

/// An opened, validated repository.
pub struct RepoHandle {
    kind: RepoKind,
    path: PathBuf,
    git: Arc<dyn GitOperations>,
}

impl fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoHandle")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish()
    }
}

fn local_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn remote_ref(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{remote}/{branch}")
}

impl RepoHandle {
    /// Opens a repository, checking that the path is a git work tree with an
    /// `origin` remote.
    pub fn open(kind: RepoKind, path: &Path, git: Arc<dyn GitOperations>) -> Result<Self> {
        let repo_error = |message: &str| Error::Repo {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if !path.exists() {
            return Err(repo_error("path does not exist"));
        }
        if !git.is_work_tree(path) {
            return Err(repo_error("path is not a git work tree"));
        }
        if !git.remotes(path)?.iter().any(|r| r == ORIGIN_REMOTE) {
            return Err(repo_error("repository has no 'origin' remote"));
        }

        debug!("Opened {} at {}", kind, path.display());
        Ok(Self {
            kind,
            path: path.to_path_buf(),
            git,
        })
    }

    pub fn kind(&self) -> RepoKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short name used in messages: the repository directory name.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn fetch_origin(&self) -> Result<()> {
        self.git.fetch(&self.path, ORIGIN_REMOTE, None)
    }

    pub fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.git.fetch(&self.path, remote, Some(branch))
    }

    pub fn resolve(&self, reference: &str) -> Result<Option<String>> {
        self.git.resolve(&self.path, reference)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        self.git.current_branch(&self.path)
    }

    /// Adds `name` as a remote unless it already exists. Returns whether it
    /// was added.
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<bool> {
        if self.git.remotes(&self.path)?.iter().any(|r| r == name) {
            return Ok(false);
        }
        self.git.add_remote(&self.path, name, url)?;
        Ok(true)
    }

    pub fn merge(&self, revision: &str) -> Result<MergeOutcome> {
        self.git.merge(&self.path, revision)
    }

    pub fn merge_abort(&self) -> Result<()> {
        self.git.merge_abort(&self.path)
    }

    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.git.push(&self.path, remote, branch)
    }

    /// Compares a local branch with its `origin` counterpart without mutating
    /// anything.
    pub fn branch_state(&self, branch: &str) -> Result<BranchState> {
        let Some(local) = self.resolve(&local_ref(branch))? else {
            return Ok(BranchState::MissingLocal);
        };
        let Some(remote) = self.resolve(&remote_ref(ORIGIN_REMOTE, branch))? else {
            return Ok(BranchState::MissingRemote);
        };
        if local == remote {
            return Ok(BranchState::UpToDate);
        }

        let (ahead, behind) = self.git.count_divergence(&self.path, &local, &remote)?;
        if ahead == 0 {
            Ok(BranchState::FastForwardable { behind })
        } else {
            Ok(BranchState::Diverged { ahead, behind })
        }
    }

    /// Moves a local branch to its `origin` counterpart.
    pub fn apply(&self, branch: &str, action: BranchAction) -> Result<ApplyOutcome> {
        if action == BranchAction::Skip {
            return Ok(ApplyOutcome::Skipped);
        }

        let local = self.resolve(&local_ref(branch))?.ok_or_else(|| Error::Repo {
            path: self.path.clone(),
            message: format!("branch '{}' does not exist locally", branch),
        })?;
        let remote = self
            .resolve(&remote_ref(ORIGIN_REMOTE, branch))?
            .ok_or_else(|| Error::Repo {
                path: self.path.clone(),
                message: format!("branch '{}' does not exist on '{}'", branch, ORIGIN_REMOTE),
            })?;
        if local == remote {
            return Ok(ApplyOutcome::Unchanged);
        }

        match action {
            BranchAction::FastForward => {
                if !self.git.is_ancestor(&self.path, &local, &remote)? {
                    return Err(Error::NotFastForwardable {
                        repo: self.name(),
                        branch: branch.to_string(),
                    });
                }
                self.move_branch(branch, &local, &remote)?;
                Ok(ApplyOutcome::FastForwarded {
                    from: local,
                    to: remote,
                })
            }
            BranchAction::HardReset => {
                let (discarded, _) = self.git.count_divergence(&self.path, &local, &remote)?;
                self.move_branch(branch, &local, &remote)?;
                warn!(
                    "Reset '{}' in {} to {}/{}, discarding {} local commit(s)",
                    branch,
                    self.name(),
                    ORIGIN_REMOTE,
                    branch,
                    discarded
                );
                Ok(ApplyOutcome::Reset {
                    from: local,
                    to: remote,
                    discarded,
                })
            }
            BranchAction::Skip => Ok(ApplyOutcome::Skipped),
        }
    }

    /// Moves `branch` from `from` to `to` with one compare-and-swap ref
    /// update. A checked-out branch must be clean; its work tree is synced
    /// only after the ref has moved, so an interruption in between leaves the
    /// ref at `to` and a work tree that `git reset --hard` repairs.
    fn move_branch(&self, branch: &str, from: &str, to: &str) -> Result<()> {
        let checked_out = self.current_branch()?.as_deref() == Some(branch);
        if checked_out && self.git.is_dirty(&self.path)? {
            return Err(Error::Repo {
                path: self.path.clone(),
                message: format!(
                    "branch '{}' is checked out and has uncommitted changes",
                    branch
                ),
            });
        }

        self.git.update_ref(&self.path, &local_ref(branch), to, from)?;
        if checked_out {
            self.git.reset_hard(&self.path, to)?;
        }
        Ok(())
    }

    /// Checks out `branch`, runs `f`, then restores whatever was checked out
    /// before, on every exit path.
    pub fn with_branch<T>(&self, branch: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let previous = match self.current_branch()? {
            Some(current) if current == branch => return f(self),
            Some(current) => current,
            None => self.resolve("HEAD")?.ok_or_else(|| Error::Repo {
                path: self.path.clone(),
                message: "HEAD does not point at a commit".to_string(),
            })?,
        };

        self.git.checkout(&self.path, branch)?;
        let guard = CheckoutGuard {
            handle: self,
            previous: Some(previous),
        };
        let result = f(self);
        let restored = guard.restore();

        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_error)) => {
                warn!("{}", restore_error);
                Err(e)
            }
        }
    }
}

/// Restores a previous checkout when dropped, so that a panic inside
/// [`RepoHandle::with_branch`] does not leave the wrong branch checked out.
struct CheckoutGuard<'a> {
    handle: &'a RepoHandle,
    previous: Option<String>,
}

impl CheckoutGuard<'_> {
    fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => self.handle.git.checkout(&self.handle.path, &previous),
            None => Ok(()),
        }
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.handle.git.checkout(&self.handle.path, &previous) {
                warn!("Could not restore '{}' in {}: {}", previous, self.handle.name(), e);
            }
        }
    }
}

/// Both shared repositories, opened from the settings.
#[derive(Debug)]
pub struct RepoSet {
    pub recipes: RepoHandle,
    pub stack: RepoHandle,
}

impl RepoSet {
    pub fn open(settings: &Settings, git: Arc<dyn GitOperations>) -> Result<Self> {
        Ok(Self {
            recipes: RepoHandle::open(RepoKind::Recipes, &settings.easyconfigs_repo, git.clone())?,
            stack: RepoHandle::open(RepoKind::Stack, &settings.software_stack_repo, git)?,
        })
    }

    /// Checks out `branch` in both repositories for the duration of `f`.
    pub fn with_branch<T>(&self, branch: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.recipes
            .with_branch(branch, |_| self.stack.with_branch(branch, |_| f(self)))
    }
}
