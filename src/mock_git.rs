//! In-memory [`GitOperations`] used by unit tests.
//!
//! Each repository is keyed by its path and holds a commit graph, local and
//! remote-tracking refs, a HEAD, and the branches "on the server" for every
//! remote. `fetch` copies server branches into remote-tracking refs and
//! `push` copies a local branch back to the server. Every call is recorded
//! as a short command line for assertions.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::repository::{GitOperations, MergeOutcome};

#[derive(Debug, Clone)]
enum Head {
    Branch(String),
    Detached(String),
}

#[derive(Debug)]
struct MockRepo {
    parents: HashMap<String, Vec<String>>,
    refs: BTreeMap<String, String>,
    head: Head,
    remotes: BTreeSet<String>,
    server: BTreeMap<String, BTreeMap<String, String>>,
    conflicts: HashMap<String, Vec<String>>,
    dirty: bool,
    merging: bool,
    fail_fetch: bool,
    pushes: Vec<(String, String, String)>,
}

impl MockRepo {
    fn new() -> Self {
        Self {
            parents: HashMap::new(),
            refs: BTreeMap::new(),
            head: Head::Branch("develop".to_string()),
            remotes: BTreeSet::from(["origin".to_string()]),
            server: BTreeMap::new(),
            conflicts: HashMap::new(),
            dirty: false,
            merging: false,
            fail_fetch: false,
            pushes: Vec::new(),
        }
    }

    fn head_commit(&self) -> Option<String> {
        match &self.head {
            Head::Branch(b) => self.refs.get(&format!("refs/heads/{b}")).cloned(),
            Head::Detached(c) => Some(c.clone()),
        }
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        if reference == "HEAD" {
            return self.head_commit();
        }
        [
            reference.to_string(),
            format!("refs/heads/{reference}"),
            format!("refs/remotes/{reference}"),
        ]
        .iter()
        .find_map(|r| self.refs.get(r).cloned())
        .or_else(|| {
            self.parents
                .contains_key(reference)
                .then(|| reference.to_string())
        })
    }

    fn ancestors(&self, commit: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([commit.to_string()]);
        while let Some(c) = queue.pop_front() {
            if seen.insert(c.clone()) {
                if let Some(parents) = self.parents.get(&c) {
                    queue.extend(parents.iter().cloned());
                }
            }
        }
        seen
    }

    fn set_head_commit(&mut self, commit: &str) {
        match &self.head {
            Head::Branch(b) => {
                self.refs.insert(format!("refs/heads/{b}"), commit.to_string());
            }
            Head::Detached(_) => self.head = Head::Detached(commit.to_string()),
        }
    }
}

/// An in-memory git.
#[derive(Debug, Default)]
pub struct MockGit {
    repos: Mutex<HashMap<PathBuf, MockRepo>>,
    calls: Mutex<Vec<String>>,
    next_id: Mutex<usize>,
}

fn failure(repo: &Path, command: &str, stderr: &str) -> Error {
    Error::GitCommand {
        command: command.to_string(),
        repo: repo.display().to_string(),
        stderr: stderr.to_string(),
    }
}

impl MockGit {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn with_repo<T>(&self, repo: &Path, f: impl FnOnce(&mut MockRepo) -> T) -> T {
        let mut repos = self.repos.lock().unwrap();
        let state = repos
            .get_mut(repo)
            .unwrap_or_else(|| panic!("no mock repository at {}", repo.display()));
        f(state)
    }

    /// Registers a repository with an `origin` remote.
    pub fn add_repo(&self, repo: &Path) {
        self.repos
            .lock()
            .unwrap()
            .insert(repo.to_path_buf(), MockRepo::new());
    }

    pub fn remove_remote(&self, repo: &Path, name: &str) {
        self.with_repo(repo, |r| r.remotes.remove(name));
    }

    /// Creates a commit with the given parents and returns its id.
    pub fn commit(&self, repo: &Path, parents: &[&str]) -> String {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("c{:04}", *next)
        };
        self.with_repo(repo, |r| {
            r.parents
                .insert(id.clone(), parents.iter().map(|p| p.to_string()).collect())
        });
        id
    }

    pub fn set_branch(&self, repo: &Path, branch: &str, commit: &str) {
        self.with_repo(repo, |r| {
            r.refs
                .insert(format!("refs/heads/{branch}"), commit.to_string())
        });
    }

    /// Sets a branch on the server and the matching remote-tracking ref.
    pub fn set_remote_branch(&self, repo: &Path, remote: &str, branch: &str, commit: &str) {
        self.set_server_branch(repo, remote, branch, commit);
        self.with_repo(repo, |r| {
            r.refs.insert(
                format!("refs/remotes/{remote}/{branch}"),
                commit.to_string(),
            )
        });
    }

    /// Sets a branch on the server only; it becomes visible after a fetch.
    pub fn set_server_branch(&self, repo: &Path, remote: &str, branch: &str, commit: &str) {
        self.with_repo(repo, |r| {
            r.server
                .entry(remote.to_string())
                .or_default()
                .insert(branch.to_string(), commit.to_string())
        });
    }

    pub fn set_head_branch(&self, repo: &Path, branch: &str) {
        self.with_repo(repo, |r| r.head = Head::Branch(branch.to_string()));
    }

    pub fn set_head_detached(&self, repo: &Path, commit: &str) {
        self.with_repo(repo, |r| r.head = Head::Detached(commit.to_string()));
    }

    pub fn set_dirty(&self, repo: &Path, dirty: bool) {
        self.with_repo(repo, |r| r.dirty = dirty);
    }

    pub fn fail_fetch(&self, repo: &Path) {
        self.with_repo(repo, |r| r.fail_fetch = true);
    }

    /// Makes a non-fast-forward merge of `commit` stop with conflicts.
    pub fn set_conflict(&self, repo: &Path, commit: &str, paths: &[&str]) {
        self.with_repo(repo, |r| {
            r.conflicts.insert(
                commit.to_string(),
                paths.iter().map(|p| p.to_string()).collect(),
            )
        });
    }

    pub fn branch(&self, repo: &Path, branch: &str) -> Option<String> {
        self.with_repo(repo, |r| r.refs.get(&format!("refs/heads/{branch}")).cloned())
    }

    pub fn server_branch(&self, repo: &Path, remote: &str, branch: &str) -> Option<String> {
        self.with_repo(repo, |r| {
            r.server
                .get(remote)
                .and_then(|branches| branches.get(branch))
                .cloned()
        })
    }

    pub fn head_branch(&self, repo: &Path) -> Option<String> {
        self.with_repo(repo, |r| match &r.head {
            Head::Branch(b) => Some(b.clone()),
            Head::Detached(_) => None,
        })
    }

    pub fn is_merging(&self, repo: &Path) -> bool {
        self.with_repo(repo, |r| r.merging)
    }

    pub fn pushes(&self, repo: &Path) -> Vec<(String, String, String)> {
        self.with_repo(repo, |r| r.pushes.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl GitOperations for MockGit {
    fn is_work_tree(&self, repo: &Path) -> bool {
        self.repos.lock().unwrap().contains_key(repo)
    }

    fn remotes(&self, repo: &Path) -> Result<Vec<String>> {
        Ok(self.with_repo(repo, |r| r.remotes.iter().cloned().collect()))
    }

    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<()> {
        self.record(format!("remote add {name} {url}"));
        self.with_repo(repo, |r| r.remotes.insert(name.to_string()));
        Ok(())
    }

    fn fetch(&self, repo: &Path, remote: &str, branch: Option<&str>) -> Result<()> {
        self.record(format!("fetch {remote} {}", branch.unwrap_or("")).trim().to_string());
        self.with_repo(repo, |r| {
            if r.fail_fetch {
                return Err(failure(repo, "fetch", "Could not read from remote repository"));
            }
            if !r.remotes.contains(remote) {
                return Err(failure(repo, "fetch", "no such remote"));
            }
            let server = r.server.get(remote).cloned().unwrap_or_default();
            let selected: Vec<(String, String)> = match branch {
                Some(b) => match server.get(b) {
                    Some(c) => vec![(b.to_string(), c.clone())],
                    None => return Err(failure(repo, "fetch", "couldn't find remote ref")),
                },
                None => server.into_iter().collect(),
            };
            for (b, c) in selected {
                r.refs.insert(format!("refs/remotes/{remote}/{b}"), c);
            }
            Ok(())
        })
    }

    fn resolve(&self, repo: &Path, reference: &str) -> Result<Option<String>> {
        Ok(self.with_repo(repo, |r| r.resolve(reference)))
    }

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        Ok(self.with_repo(repo, |r| r.ancestors(descendant).contains(ancestor)))
    }

    fn count_divergence(&self, repo: &Path, local: &str, remote: &str) -> Result<(usize, usize)> {
        Ok(self.with_repo(repo, |r| {
            let local = r.ancestors(local);
            let remote = r.ancestors(remote);
            (
                local.difference(&remote).count(),
                remote.difference(&local).count(),
            )
        }))
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        Ok(self.head_branch(repo))
    }

    fn is_dirty(&self, repo: &Path) -> Result<bool> {
        Ok(self.with_repo(repo, |r| r.dirty))
    }

    fn update_ref(&self, repo: &Path, reference: &str, new: &str, old: &str) -> Result<()> {
        self.record(format!("update-ref {reference} {new} {old}"));
        self.with_repo(repo, |r| {
            if r.refs.get(reference).map(String::as_str) != Some(old) {
                return Err(failure(repo, "update-ref", "ref changed concurrently"));
            }
            r.refs.insert(reference.to_string(), new.to_string());
            Ok(())
        })
    }

    fn reset_hard(&self, repo: &Path, target: &str) -> Result<()> {
        self.record(format!("reset --hard {target}"));
        self.with_repo(repo, |r| {
            let commit = r
                .resolve(target)
                .ok_or_else(|| failure(repo, "reset", "unknown revision"))?;
            r.set_head_commit(&commit);
            r.dirty = false;
            Ok(())
        })
    }

    fn checkout(&self, repo: &Path, target: &str) -> Result<()> {
        self.record(format!("checkout {target}"));
        self.with_repo(repo, |r| {
            if r.merging {
                return Err(failure(repo, "checkout", "you need to resolve your current index first"));
            }
            if r.refs.contains_key(&format!("refs/heads/{target}")) {
                r.head = Head::Branch(target.to_string());
                return Ok(());
            }
            let commit = r
                .resolve(target)
                .ok_or_else(|| failure(repo, "checkout", "pathspec did not match"))?;
            r.head = Head::Detached(commit);
            Ok(())
        })
    }

    fn merge(&self, repo: &Path, revision: &str) -> Result<MergeOutcome> {
        self.record(format!("merge {revision}"));
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("m{:04}", *next)
        };
        self.with_repo(repo, |r| {
            let head = r
                .head_commit()
                .ok_or_else(|| failure(repo, "merge", "no HEAD"))?;
            let theirs = r
                .resolve(revision)
                .ok_or_else(|| failure(repo, "merge", "not something we can merge"))?;

            if r.ancestors(&head).contains(&theirs) {
                return Ok(MergeOutcome::UpToDate);
            }
            if r.ancestors(&theirs).contains(&head) {
                r.set_head_commit(&theirs);
                return Ok(MergeOutcome::Merged {
                    from: head,
                    to: theirs,
                });
            }
            if let Some(paths) = r.conflicts.get(&theirs).cloned() {
                r.merging = true;
                return Ok(MergeOutcome::Conflict(paths));
            }
            r.parents.insert(id.clone(), vec![head.clone(), theirs]);
            r.set_head_commit(&id);
            Ok(MergeOutcome::Merged { from: head, to: id })
        })
    }

    fn merge_abort(&self, repo: &Path) -> Result<()> {
        self.record("merge --abort".to_string());
        self.with_repo(repo, |r| {
            if !r.merging {
                return Err(failure(repo, "merge --abort", "There is no merge to abort"));
            }
            r.merging = false;
            Ok(())
        })
    }

    fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.record(format!("push {remote} {branch}"));
        self.with_repo(repo, |r| {
            let commit = r
                .refs
                .get(&format!("refs/heads/{branch}"))
                .cloned()
                .ok_or_else(|| failure(repo, "push", "src refspec does not match any"))?;
            r.server
                .entry(remote.to_string())
                .or_default()
                .insert(branch.to_string(), commit.clone());
            r.refs
                .insert(format!("refs/remotes/{remote}/{branch}"), commit.clone());
            r.pushes
                .push((remote.to_string(), branch.to_string(), commit));
            Ok(())
        })
    }
}
