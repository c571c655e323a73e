//! Thin wrappers over the system `git` binary.
//!
//! Every function runs `git -C <repo> ...` and maps an unsuccessful exit into
//! [`Error::GitCommand`] carrying the command line, the repository and git's
//! stderr. Using the system binary means SSH keys, credential helpers and any
//! authentication configured in `~/.gitconfig` apply to fetch and push.

use std::path::Path;
use std::process::{Command, Output};

use log::debug;

use crate::error::{Error, Result};

/// Result of merging a revision into the checked-out branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing new to merge.
    UpToDate,
    /// HEAD moved from `from` to `to`.
    Merged { from: String, to: String },
    /// The merge stopped with conflicts in these paths. The merge is left in
    /// progress.
    Conflict(Vec<String>),
}

fn git_error(repo: &Path, args: &[&str], stderr: impl Into<String>) -> Error {
    Error::GitCommand {
        command: args.join(" "),
        repo: repo.display().to_string(),
        stderr: stderr.into(),
    }
}

/// Runs git and returns its raw output, whatever the exit status.
fn output(repo: &Path, args: &[&str]) -> Result<Output> {
    debug!("git -C {} {}", repo.display(), args.join(" "));
    Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .map_err(|e| git_error(repo, args, e.to_string()))
}

/// Runs git, requiring success, and returns trimmed stdout.
fn run(repo: &Path, args: &[&str]) -> Result<String> {
    let out = output(repo, args)?;
    if !out.status.success() {
        return Err(git_error(
            repo,
            args,
            String::from_utf8_lossy(&out.stderr).trim(),
        ));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Runs git where exit status 1 means "no" and anything else above is a failure.
fn run_predicate(repo: &Path, args: &[&str]) -> Result<Option<String>> {
    let out = output(repo, args)?;
    match out.status.code() {
        Some(0) => Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string())),
        Some(1) => Ok(None),
        _ => Err(git_error(
            repo,
            args,
            String::from_utf8_lossy(&out.stderr).trim(),
        )),
    }
}

/// Whether `repo` is inside a non-bare git work tree.
pub fn is_work_tree(repo: &Path) -> bool {
    matches!(
        run(repo, &["rev-parse", "--is-inside-work-tree"]).as_deref(),
        Ok("true")
    )
}

/// Names of the configured remotes.
pub fn remotes(repo: &Path) -> Result<Vec<String>> {
    Ok(run(repo, &["remote"])?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub fn add_remote(repo: &Path, name: &str, url: &str) -> Result<()> {
    run(repo, &["remote", "add", name, url]).map(|_| ())
}

/// Fetches `remote`, optionally limited to one branch.
pub fn fetch(repo: &Path, remote: &str, branch: Option<&str>) -> Result<()> {
    let refspec;
    let mut args = vec!["fetch", "--quiet", remote];
    if let Some(branch) = branch {
        refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
        args.push(&refspec);
    }
    run(repo, &args).map(|_| ())
}

/// Resolves a ref to a commit id, `None` when it does not exist.
pub fn resolve(repo: &Path, reference: &str) -> Result<Option<String>> {
    let spec = format!("{reference}^{{commit}}");
    run_predicate(repo, &["rev-parse", "--verify", "--quiet", &spec])
}

/// Whether `ancestor` is reachable from `descendant`.
pub fn is_ancestor(repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
    Ok(run_predicate(repo, &["merge-base", "--is-ancestor", ancestor, descendant])?.is_some())
}

/// Commits only in `local` and only in `remote`, as `(ahead, behind)`.
pub fn count_divergence(repo: &Path, local: &str, remote: &str) -> Result<(usize, usize)> {
    let range = format!("{local}...{remote}");
    let args = ["rev-list", "--left-right", "--count", range.as_str()];
    let stdout = run(repo, &args)?;
    parse_divergence(&stdout).ok_or_else(|| {
        git_error(
            repo,
            &args,
            format!("unexpected rev-list output '{}'", stdout),
        )
    })
}

fn parse_divergence(stdout: &str) -> Option<(usize, usize)> {
    let mut counts = stdout.split_whitespace().map(str::parse::<usize>);
    match (counts.next(), counts.next(), counts.next()) {
        (Some(Ok(ahead)), Some(Ok(behind)), None) => Some((ahead, behind)),
        _ => None,
    }
}

/// Name of the checked-out branch, `None` on a detached HEAD.
pub fn current_branch(repo: &Path) -> Result<Option<String>> {
    run_predicate(repo, &["symbolic-ref", "--quiet", "--short", "HEAD"])
}

/// Whether tracked files have uncommitted changes.
pub fn is_dirty(repo: &Path) -> Result<bool> {
    Ok(!run(repo, &["status", "--porcelain", "--untracked-files=no"])?.is_empty())
}

/// Moves `reference` to `new` only if it still points at `old`.
pub fn update_ref(repo: &Path, reference: &str, new: &str, old: &str) -> Result<()> {
    run(repo, &["update-ref", reference, new, old]).map(|_| ())
}

pub fn reset_hard(repo: &Path, target: &str) -> Result<()> {
    run(repo, &["reset", "--quiet", "--hard", target]).map(|_| ())
}

/// Checks out a branch, or detaches HEAD at a commit.
pub fn checkout(repo: &Path, target: &str) -> Result<()> {
    run(repo, &["checkout", "--quiet", target]).map(|_| ())
}

/// Merges `revision` into the checked-out branch.
pub fn merge(repo: &Path, revision: &str) -> Result<MergeOutcome> {
    let before = run(repo, &["rev-parse", "HEAD"])?;
    let args = ["merge", "--no-edit", "--quiet", revision];
    let out = output(repo, &args)?;

    if out.status.success() {
        let after = run(repo, &["rev-parse", "HEAD"])?;
        if after == before {
            return Ok(MergeOutcome::UpToDate);
        }
        return Ok(MergeOutcome::Merged {
            from: before,
            to: after,
        });
    }

    let conflicts = parse_paths(&run(repo, &["diff", "--name-only", "--diff-filter=U"])?);
    if conflicts.is_empty() {
        return Err(git_error(
            repo,
            &args,
            String::from_utf8_lossy(&out.stderr).trim(),
        ));
    }
    Ok(MergeOutcome::Conflict(conflicts))
}

pub fn merge_abort(repo: &Path) -> Result<()> {
    run(repo, &["merge", "--abort"]).map(|_| ())
}

pub fn push(repo: &Path, remote: &str, branch: &str) -> Result<()> {
    run(repo, &["push", "--quiet", remote, branch]).map(|_| ())
}

fn parse_paths(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
