//! # Branch Reconciliation
//!
//! Brings the local node branches of a repository in line with `origin`.
//!
//! For each repository, `origin` is fetched once, then branches are processed
//! strictly one after the other:
//!
//! 1. the local node's own branch,
//! 2. the branches of the other nodes in scope, in configured order,
//! 3. the repository's main branch (`develop` or `main`), governed by the
//!    own-branch policy.
//!
//! A branch that is only behind is fast-forwarded without asking. A branch
//! whose history diverged is handled by its [`ResetPolicy`]: `no` leaves it
//! untouched, `yes` resets it to `origin`, and `interactive` asks a
//! [`Confirmer`]. Failures are recorded per branch and never stop the
//! remaining branches.

use std::collections::VecDeque;
use std::fmt;

use dialoguer::{theme::ColorfulTheme, Confirm};
use log::{info, warn};

use crate::config::Settings;
use crate::defaults::ORIGIN_REMOTE;
use crate::error::{Error, Result};
use crate::node::{Node, ResetPolicy};
use crate::repository::{ApplyOutcome, BranchAction, BranchState, RepoHandle, RepoKind};

/// Asks whether a diverged branch may be reset.
pub trait Confirmer {
    /// Returns `true` when the reset is approved.
    fn confirm(&mut self, branch: &str, summary: &str) -> Result<bool>;
}

/// Prompts on the terminal. The default answer is no.
#[derive(Debug, Default)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, branch: &str, summary: &str) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{}\nReset branch '{}' to its remote?", summary, branch))
            .default(false)
            .interact()
            .map_err(|e| Error::Confirmation {
                message: e.to_string(),
            })
    }
}

/// Replays a fixed list of answers and records every question asked.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: VecDeque<bool>,
    /// `(branch, summary)` of every question, in order.
    pub questions: Vec<(String, String)>,
}

impl ScriptedConfirmer {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            questions: Vec::new(),
        }
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, branch: &str, summary: &str) -> Result<bool> {
        self.questions.push((branch.to_string(), summary.to_string()));
        self.answers.pop_front().ok_or_else(|| Error::Confirmation {
            message: format!("no scripted answer left for branch '{}'", branch),
        })
    }
}

/// Why a branch is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchRole {
    Own,
    OtherNode,
    Main,
}

/// What happened to one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchStatus {
    UpToDate,
    FastForwarded { behind: usize },
    /// Reset to `origin`, dropping `discarded` local commits.
    Reset { discarded: usize },
    /// Diverged and left untouched because the policy is `no`.
    Skipped { ahead: usize, behind: usize },
    /// Diverged and left untouched because the reset was not confirmed.
    Declined { ahead: usize, behind: usize },
    MissingLocal,
    MissingRemote,
    Failed { message: String },
}

impl BranchStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, BranchStatus::Failed { .. })
    }
}

impl fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchStatus::UpToDate => write!(f, "up to date"),
            BranchStatus::FastForwarded { behind } => {
                write!(f, "fast-forwarded by {} commit(s)", behind)
            }
            BranchStatus::Reset { discarded } => write!(
                f,
                "reset to {}, {} local commit(s) discarded",
                ORIGIN_REMOTE, discarded
            ),
            BranchStatus::Skipped { ahead, behind } => write!(
                f,
                "diverged ({} ahead, {} behind), skipped by policy",
                ahead, behind
            ),
            BranchStatus::Declined { ahead, behind } => write!(
                f,
                "diverged ({} ahead, {} behind), reset declined",
                ahead, behind
            ),
            BranchStatus::MissingLocal => write!(f, "no local branch, nothing done"),
            BranchStatus::MissingRemote => {
                write!(f, "no branch on {}, nothing done", ORIGIN_REMOTE)
            }
            BranchStatus::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub branch: String,
    pub role: BranchRole,
    pub status: BranchStatus,
}

/// Outcome of reconciling one repository.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub repo: String,
    pub kind: RepoKind,
    /// Set when `origin` could not be fetched; no branch was processed.
    pub fetch_error: Option<String>,
    pub branches: Vec<BranchReport>,
}

impl ReconcileReport {
    pub fn has_failures(&self) -> bool {
        self.fetch_error.is_some() || self.branches.iter().any(|b| b.status.is_failure())
    }

    /// Total number of local commits discarded by resets.
    pub fn discarded_commits(&self) -> usize {
        self.branches
            .iter()
            .map(|b| match b.status {
                BranchStatus::Reset { discarded } => discarded,
                _ => 0,
            })
            .sum()
    }
}

/// Reconciles node branches under the configured policies.
pub struct BranchReconciler<'a> {
    node: Node,
    other_nodes: Vec<Node>,
    own_policy: ResetPolicy,
    other_policy: ResetPolicy,
    confirmer: &'a mut dyn Confirmer,
}

impl<'a> BranchReconciler<'a> {
    pub fn new(settings: &Settings, confirmer: &'a mut dyn Confirmer) -> Self {
        Self {
            node: settings.node,
            other_nodes: settings.other_nodes.clone(),
            own_policy: settings.reset_node_branch,
            other_policy: settings.reset_other_nodes_branch,
            confirmer,
        }
    }

    /// Branches to process in `kind`, in processing order.
    pub fn branch_order(&self, kind: RepoKind) -> Vec<(String, BranchRole, ResetPolicy)> {
        let mut order = vec![(
            self.node.branch_name().to_string(),
            BranchRole::Own,
            self.own_policy,
        )];
        order.extend(self.other_nodes.iter().map(|n| {
            (
                n.branch_name().to_string(),
                BranchRole::OtherNode,
                self.other_policy,
            )
        }));
        order.push((kind.main_branch().to_string(), BranchRole::Main, self.own_policy));
        order
    }

    pub fn reconcile(&mut self, repo: &RepoHandle) -> ReconcileReport {
        let mut report = ReconcileReport {
            repo: repo.name(),
            kind: repo.kind(),
            fetch_error: None,
            branches: Vec::new(),
        };

        info!("Fetching {} for {}", ORIGIN_REMOTE, repo.name());
        if let Err(e) = repo.fetch_origin() {
            warn!("Skipping {}: {}", repo.name(), e);
            report.fetch_error = Some(e.to_string());
            return report;
        }

        for (branch, role, policy) in self.branch_order(repo.kind()) {
            let status = self
                .reconcile_branch(repo, &branch, policy)
                .unwrap_or_else(|e| BranchStatus::Failed {
                    message: e.to_string(),
                });
            info!("{}: '{}' {}", repo.name(), branch, status);
            report.branches.push(BranchReport {
                branch,
                role,
                status,
            });
        }
        report
    }

    fn reconcile_branch(
        &mut self,
        repo: &RepoHandle,
        branch: &str,
        policy: ResetPolicy,
    ) -> Result<BranchStatus> {
        match repo.branch_state(branch)? {
            BranchState::UpToDate => Ok(BranchStatus::UpToDate),
            BranchState::FastForwardable { behind } => {
                repo.apply(branch, BranchAction::FastForward)?;
                Ok(BranchStatus::FastForwarded { behind })
            }
            BranchState::Diverged { ahead, behind } => match policy {
                ResetPolicy::No => Ok(BranchStatus::Skipped { ahead, behind }),
                ResetPolicy::Yes => reset(repo, branch),
                ResetPolicy::Interactive => {
                    let summary = format!(
                        "Branch '{}' of {} has diverged from {}/{}: {} local commit(s) would be discarded, {} remote commit(s) would be taken.",
                        branch,
                        repo.name(),
                        ORIGIN_REMOTE,
                        branch,
                        ahead,
                        behind
                    );
                    if self.confirmer.confirm(branch, &summary)? {
                        reset(repo, branch)
                    } else {
                        Ok(BranchStatus::Declined { ahead, behind })
                    }
                }
            },
            BranchState::MissingLocal => {
                warn!("{}: no local branch '{}'", repo.name(), branch);
                Ok(BranchStatus::MissingLocal)
            }
            BranchState::MissingRemote => {
                warn!(
                    "{}: branch '{}' does not exist on {}",
                    repo.name(),
                    branch,
                    ORIGIN_REMOTE
                );
                Ok(BranchStatus::MissingRemote)
            }
        }
    }
}

fn reset(repo: &RepoHandle, branch: &str) -> Result<BranchStatus> {
    match repo.apply(branch, BranchAction::HardReset)? {
        ApplyOutcome::Reset { discarded, .. } => Ok(BranchStatus::Reset { discarded }),
        ApplyOutcome::Unchanged => Ok(BranchStatus::UpToDate),
        other => Err(Error::Repo {
            path: repo.path().to_path_buf(),
            message: format!("unexpected outcome {:?} for reset of '{}'", other, branch),
        }),
    }
}
