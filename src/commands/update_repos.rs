//! # Update Repos Command Implementation
//!
//! Reconciles the node branches of the recipe and stack repositories with
//! `origin`, then optionally merges the upstream easyconfigs into the recipe
//! repository.
//!
//! Each repository is handled independently: a repository that cannot be
//! opened or fetched is reported and the other one is still processed. The
//! command exits with an error when anything failed, after all possible work
//! was done.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use stack_builder::error::Error;
use stack_builder::output::{Marker, OutputConfig};
use stack_builder::reconcile::{BranchReconciler, BranchStatus, ReconcileReport, TerminalConfirmer};
use stack_builder::repository::{DefaultGitOperations, GitOperations, RepoHandle, RepoKind};
use stack_builder::upstream::{SyncResult, UpstreamBranch, UpstreamSync};

use super::Context;

/// Reconcile the node branches of both repositories with origin
#[derive(Args, Debug)]
pub struct UpdateReposArgs {
    /// Also merge the upstream EasyBuild easyconfigs into the recipe repository
    #[arg(long)]
    pub from_upstream: bool,

    /// Upstream branch to merge
    #[arg(long, value_enum, value_name = "BRANCH", default_value_t = UpstreamChoice::Develop)]
    pub upstream_branch: UpstreamChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UpstreamChoice {
    Develop,
    Main,
}

impl From<UpstreamChoice> for UpstreamBranch {
    fn from(choice: UpstreamChoice) -> Self {
        match choice {
            UpstreamChoice::Develop => UpstreamBranch::Develop,
            UpstreamChoice::Main => UpstreamBranch::Main,
        }
    }
}

pub fn execute(args: UpdateReposArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let settings = &config.settings;
    let out = &context.output;
    let git: Arc<dyn GitOperations> = Arc::new(DefaultGitOperations);

    println!(
        "{} Node {} (settings: {})",
        out.marker(Marker::Ok),
        settings.node,
        config.settings_file.display()
    );

    let mut confirmer = TerminalConfirmer;
    let mut reconciler = BranchReconciler::new(settings, &mut confirmer);
    let mut failures = 0;
    let mut recipes: Option<RepoHandle> = None;

    for (kind, path) in [
        (RepoKind::Recipes, &settings.easyconfigs_repo),
        (RepoKind::Stack, &settings.software_stack_repo),
    ] {
        let handle = match RepoHandle::open(kind, path, git.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                println!("\n{} {}", out.marker(Marker::Failed), e);
                failures += 1;
                continue;
            }
        };

        let report = reconciler.reconcile(&handle);
        print!("\n{}", render_report(&report, out));
        if report.has_failures() {
            failures += 1;
        }
        if kind == RepoKind::Recipes {
            recipes = Some(handle);
        }
    }

    if args.from_upstream {
        println!();
        match &recipes {
            Some(handle) => match UpstreamSync::new(handle).sync(args.upstream_branch.into()) {
                Ok(SyncResult::UpToDate) => println!(
                    "{} '{}' is already up to date with upstream",
                    out.marker(Marker::Ok),
                    args.upstream_branch.as_branch()
                ),
                Ok(SyncResult::Merged { from, to }) => println!(
                    "{} Merged upstream into '{}' ({}..{}) and pushed to origin",
                    out.marker(Marker::Updated),
                    args.upstream_branch.as_branch(),
                    short(&from),
                    short(&to)
                ),
                Err(Error::MergeConflict { branch, paths }) => {
                    println!(
                        "{} Upstream merge into '{}' conflicts, merge aborted and nothing pushed:",
                        out.marker(Marker::Failed),
                        branch
                    );
                    for path in paths {
                        println!("    {}", path);
                    }
                    failures += 1;
                }
                Err(e) => {
                    println!("{} Upstream sync failed: {}", out.marker(Marker::Failed), e);
                    failures += 1;
                }
            },
            None => {
                println!(
                    "{} Upstream sync skipped, the recipe repository is unavailable",
                    out.marker(Marker::Skipped)
                );
            }
        }
    }

    if failures > 0 {
        bail!("update-repos finished with {} failure(s)", failures);
    }
    Ok(())
}

impl UpstreamChoice {
    fn as_branch(&self) -> &'static str {
        UpstreamBranch::from(*self).as_str()
    }
}

fn short(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}

fn status_marker(status: &BranchStatus) -> Marker {
    match status {
        BranchStatus::UpToDate => Marker::Ok,
        BranchStatus::FastForwarded { .. } => Marker::Updated,
        BranchStatus::Reset { .. } => Marker::Reset,
        BranchStatus::Skipped { .. } | BranchStatus::Declined { .. } => Marker::Skipped,
        BranchStatus::MissingLocal | BranchStatus::MissingRemote => Marker::Warning,
        BranchStatus::Failed { .. } => Marker::Failed,
    }
}

/// Per-branch report of one repository.
pub fn render_report(report: &ReconcileReport, out: &OutputConfig) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", out.heading(&format!("{} ({})", report.repo, report.kind)));

    if let Some(error) = &report.fetch_error {
        let _ = writeln!(
            text,
            "  {} fetch failed, no branch processed: {}",
            out.marker(Marker::Failed),
            error
        );
        return text;
    }

    for branch in &report.branches {
        let _ = writeln!(
            text,
            "  {} {}: {}",
            out.marker(status_marker(&branch.status)),
            branch.branch,
            branch.status
        );
    }

    let discarded = report.discarded_commits();
    if discarded > 0 {
        let _ = writeln!(
            text,
            "  {} {} local commit(s) were discarded by resets",
            out.marker(Marker::Warning),
            discarded
        );
    }
    text
}
