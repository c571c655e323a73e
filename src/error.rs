//! # Error Handling
//!
//! This module defines the centralized error type for the `stack-builder`
//! library. It uses the `thiserror` library to create one `Error` enum that
//! covers every anticipated failure mode, each variant carrying enough
//! context to name the offending file, repository, branch, line or entry.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the library.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Fatality
//!
//! Not every variant is fatal to a run:
//!
//! - `Config`, `Parse`, `CyclicDependency`, `Plan` and `MissingRecipes` abort
//!   the command, since a partial configuration or a partial build plan could
//!   build software out of order.
//! - `Repo` is fatal for the repository it names only.
//! - `NotFastForwardable` is an internal signal used by branch reconciliation.
//! - `MergeConflict` is reported and does not stop the rest of an update.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for stack-builder operations
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration file is missing, malformed or holds an invalid value.
    #[error("Configuration error{}: {message}", file.as_ref().map(|f| format!(" [{}]", f.display())).unwrap_or_default())]
    Config {
        message: String,
        /// The configuration file involved, when known
        file: Option<PathBuf>,
    },

    /// A repository path is missing, is not a git work tree, or lacks the
    /// expected remote.
    #[error("Repository error for {}: {message}", path.display())]
    Repo { path: PathBuf, message: String },

    /// A fast-forward was requested on a branch whose local history is not an
    /// ancestor of its remote history.
    #[error("Branch '{branch}' in {repo} cannot be fast-forwarded: local and remote history have diverged")]
    NotFastForwardable { repo: String, branch: String },

    /// An upstream merge produced conflicts and was aborted.
    #[error("Merge conflict while merging upstream into '{branch}': {}", paths.join(", "))]
    MergeConflict { branch: String, paths: Vec<String> },

    /// The package list file is malformed.
    #[error("Package list error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The dependency relation among plan entries contains a cycle.
    #[error("Cyclic dependency detected: {cycle}")]
    CyclicDependency { cycle: String },

    /// The build plan could not be constructed.
    #[error("Build plan error: {message}")]
    Plan { message: String },

    /// A git command exited unsuccessfully.
    #[error("Git command failed in {repo}: git {command} - {stderr}")]
    GitCommand {
        command: String,
        repo: String,
        stderr: String,
    },

    /// One or more entries to build have no recipe file.
    #[error("Recipe files not found for: {}", recipes.join(", "))]
    MissingRecipes { recipes: Vec<String> },

    /// The external build engine reported a failure for an entry.
    #[error("Build failed for {entry}: {message}")]
    Build { entry: String, message: String },

    /// The interactive confirmation could not be obtained.
    #[error("Confirmation prompt failed: {message}")]
    Confirmation { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to a file.
    pub fn config(message: impl Into<String>, file: Option<PathBuf>) -> Self {
        Error::Config {
            message: message.into(),
            file,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
