//! Merging community updates from the upstream EasyBuild easyconfigs
//! repository into the recipe repository.
//!
//! A sync fetches one branch from the upstream remote, merges it into the
//! local branch of the same name and pushes the result to `origin`. A merge
//! that conflicts is aborted and nothing is pushed. The previously
//! checked-out branch is restored afterwards in all cases.

use std::fmt;

use log::info;

use crate::defaults::{ORIGIN_REMOTE, UPSTREAM_REMOTE, UPSTREAM_URL};
use crate::error::{Error, Result};
use crate::repository::{MergeOutcome, RepoHandle};

/// Branch of the upstream repository to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamBranch {
    #[default]
    Develop,
    Main,
}

impl UpstreamBranch {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamBranch::Develop => "develop",
            UpstreamBranch::Main => "main",
        }
    }
}

impl fmt::Display for UpstreamBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    UpToDate,
    /// The branch moved from `from` to `to` and was pushed to `origin`.
    Merged { from: String, to: String },
}

pub struct UpstreamSync<'a> {
    repo: &'a RepoHandle,
    remote: String,
    url: String,
}

impl<'a> UpstreamSync<'a> {
    /// Sync from the EasyBuild easyconfigs repository on GitHub.
    pub fn new(repo: &'a RepoHandle) -> Self {
        Self {
            repo,
            remote: UPSTREAM_REMOTE.to_string(),
            url: UPSTREAM_URL.to_string(),
        }
    }

    pub fn with_remote(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.remote = name.into();
        self.url = url.into();
        self
    }

    pub fn sync(&self, branch: UpstreamBranch) -> Result<SyncResult> {
        let branch = branch.as_str();

        if self.repo.ensure_remote(&self.remote, &self.url)? {
            info!("Added remote '{}' ({})", self.remote, self.url);
        }
        info!("Fetching '{}' from '{}'", branch, self.remote);
        self.repo.fetch(&self.remote, branch)?;

        let upstream = format!("refs/remotes/{}/{}", self.remote, branch);
        self.repo
            .with_branch(branch, |repo| match repo.merge(&upstream)? {
                MergeOutcome::UpToDate => {
                    info!("'{}' is already up to date with '{}'", branch, self.remote);
                    Ok(SyncResult::UpToDate)
                }
                MergeOutcome::Merged { from, to } => {
                    info!("Merged {}/{} into '{}', pushing to {}", self.remote, branch, branch, ORIGIN_REMOTE);
                    repo.push(ORIGIN_REMOTE, branch)?;
                    Ok(SyncResult::Merged { from, to })
                }
                MergeOutcome::Conflict(paths) => {
                    repo.merge_abort()?;
                    Err(Error::MergeConflict {
                        branch: branch.to_string(),
                        paths,
                    })
                }
            })
    }
}
