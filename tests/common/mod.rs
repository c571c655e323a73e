//! Shared fixtures for the integration tests: a recipe repository and a stack
//! repository cloned from bare `origin` repositories, plus the configuration
//! files pointing at them.
//!
//! Every fixture drives the real `git` binary.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::TempDir;

pub const NODES: [&str; 4] = ["ubelix", "ibu", "scicore", "vitalit"];

/// Runs git in `dir` and returns trimmed stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {} failed in {}: {}",
        args.join(" "),
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure_identity(dir: &Path) {
    git(dir, &["config", "user.name", "Stack Builder Tests"]);
    git(dir, &["config", "user.email", "tests@example.org"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Writes `content` to `file` in `repo` and commits it on the current branch.
pub fn commit_file(repo: &Path, file: &str, content: &str, message: &str) -> String {
    let path = repo.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    git(repo, &["add", file]);
    git(repo, &["commit", "--quiet", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

/// Commits on `branch` of `repo`, then returns to the previous checkout.
pub fn commit_on(repo: &Path, branch: &str, file: &str, content: &str) -> String {
    let previous = git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]);
    git(repo, &["checkout", "--quiet", branch]);
    let commit = commit_file(repo, file, content, &format!("Update {} on {}", file, branch));
    git(repo, &["checkout", "--quiet", &previous]);
    commit
}

pub fn rev(repo: &Path, reference: &str) -> String {
    git(repo, &["rev-parse", reference])
}

/// A bare origin plus a clone with a local branch for every node and for
/// `main_branch`.
pub struct SharedRepo {
    pub origin: PathBuf,
    pub clone: PathBuf,
    /// A second clone standing in for a colleague on another node.
    pub peer: PathBuf,
}

impl SharedRepo {
    pub fn create(root: &Path, name: &str, main_branch: &str, files: &[(&str, &str)]) -> Self {
        let seed = root.join(format!("{}-seed", name));
        let origin = root.join(format!("{}-origin.git", name));
        let clone = root.join(name);
        let peer = root.join(format!("{}-peer", name));

        fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init", "--quiet"]);
        configure_identity(&seed);
        git(&seed, &["checkout", "--quiet", "-b", main_branch]);
        for (file, content) in files {
            let path = seed.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        git(&seed, &["add", "-A"]);
        commit_file(&seed, "README.md", &format!("# {}\n", name), "Initial commit");
        for node in NODES {
            git(&seed, &["branch", node]);
        }

        fs::create_dir_all(&origin).unwrap();
        git(&origin, &["init", "--quiet", "--bare"]);
        git(&origin, &["symbolic-ref", "HEAD", &format!("refs/heads/{}", main_branch)]);
        git(&seed, &["remote", "add", "origin", origin.to_str().unwrap()]);
        git(&seed, &["push", "--quiet", "origin", "--all"]);

        for dir in [&clone, &peer] {
            git(
                root,
                &["clone", "--quiet", origin.to_str().unwrap(), dir.to_str().unwrap()],
            );
            configure_identity(dir);
            for node in NODES {
                git(dir, &["branch", "--quiet", node, &format!("origin/{}", node)]);
            }
        }

        Self {
            origin,
            clone,
            peer,
        }
    }

    /// Commits on `branch` in the peer clone and pushes it to origin.
    pub fn push_from_peer(&self, branch: &str, file: &str, content: &str) -> String {
        let commit = commit_on(&self.peer, branch, file, content);
        git(&self.peer, &["push", "--quiet", "origin", branch]);
        commit
    }
}

pub const ZLIB_RECIPE: &str = "name = 'zlib'\nversion = '1.2.11'\ntoolchain = SYSTEM\n";
pub const PKGA_RECIPE: &str = "name = 'pkgA'\nversion = '1.0'\ntoolchain = SYSTEM\ndependencies = [('zlib', '1.2.11')]\n";
pub const PKGB_RECIPE: &str = "name = 'pkgB'\nversion = '2.0'\ntoolchain = SYSTEM\ndependencies = [\n    ('pkgA', '1.0'),\n]\n";

pub const PACKAGE_LIST: &str = "# shared stack\nzlib-1.2.11\n\"IBU\" pkgA-1.0\n\"VIT\" pkgB-2.0.eb\n";

/// Both repositories and their configuration, for node `vitalit`.
pub struct StackFixture {
    pub temp: TempDir,
    pub recipes: SharedRepo,
    pub stack: SharedRepo,
    pub settings_file: PathBuf,
    pub easybuild_file: PathBuf,
    pub install_dir: PathBuf,
}

impl StackFixture {
    pub fn new(reset_own: &str, reset_others: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();

        let recipes = SharedRepo::create(
            &root,
            "easyconfigs",
            "develop",
            &[
                ("easybuild/easyconfigs/z/zlib/zlib-1.2.11.eb", ZLIB_RECIPE),
                ("easybuild/easyconfigs/p/pkgA/pkgA-1.0.eb", PKGA_RECIPE),
                ("easybuild/easyconfigs/p/pkgB/pkgB-2.0.eb", PKGB_RECIPE),
            ],
        );
        let stack = SharedRepo::create(
            &root,
            "software-stack",
            "main",
            &[
                ("sib_stack_package_list.txt", PACKAGE_LIST),
                ("licenses/tool.lic", "SERVER license.example.org\n"),
            ],
        );

        let install_dir = root.join("software");
        fs::create_dir_all(&install_dir).unwrap();

        let settings_file = root.join("config_stackbuilder.cfg");
        fs::write(
            &settings_file,
            format!(
                "[stackbuilder]\n\
                 sib_software_stack_repo = {}\n\
                 sib_easyconfigs_repo = {}\n\
                 sib_node = vitalit\n\
                 allow_reset_node_branch = {}\n\
                 allow_reset_other_nodes_branch = {}\n",
                stack.clone.display(),
                recipes.clone.display(),
                reset_own,
                reset_others
            ),
        )
        .unwrap();

        let easybuild_file = root.join("config.cfg");
        fs::write(
            &easybuild_file,
            format!(
                "[config]\n\
                 buildpath = {}\n\
                 sourcepath = {}\n\
                 installpath = {}\n\
                 robot-paths = {}\n",
                root.join("build").display(),
                root.join("sources").display(),
                install_dir.display(),
                recipes.clone.join("easybuild/easyconfigs").display()
            ),
        )
        .unwrap();

        Self {
            temp,
            recipes,
            stack,
            settings_file,
            easybuild_file,
            install_dir,
        }
    }

    /// Marks `name/version` as an installed module.
    pub fn install_module(&self, name: &str, version: &str) {
        let dir = self.install_dir.join("modules/all").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.lua", version)), "").unwrap();
    }
}
