//! # Stack Builder Library
//!
//! Core functionality of the `stack-builder` tool, which keeps the node
//! branches of a shared EasyBuild software stack in sync and builds the
//! stack of one node in dependency order.
//!
//! ## Quick Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use stack_builder::node::Node;
//! use stack_builder::{package_list, plan};
//!
//! let entries = package_list::parse(
//!     "# shared stack\n\
//!      zlib-1.2.11\n\
//!      \"IBU\" pkgA-1.0\n\
//!      \"VIT\" pkgB-2.0\n",
//! )
//! .unwrap();
//!
//! let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
//! deps.insert("pkgB-2.0".to_string(), vec!["pkgA-1.0".to_string()]);
//!
//! let plan = plan::build(&entries, Node::Vitalit, &[], &deps).unwrap();
//! assert_eq!(plan.keys(), vec!["zlib-1.2.11", "pkgA-1.0", "pkgB-2.0"]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Nodes (`node`)**: the closed set of clusters sharing the stack. Each
//!   node owns a branch of the same name in both repositories.
//! - **Configuration (`config`)**: the stack-builder and EasyBuild `.cfg`
//!   files, located through explicit paths, environment variables and the
//!   default configuration directory.
//! - **Repositories (`repository`, `git`)**: the recipe and stack
//!   repositories, driven through the system `git` binary behind the
//!   [`repository::GitOperations`] trait.
//! - **Reconciliation (`reconcile`)**: brings each local node branch up to
//!   date with `origin`, fast-forwarding when safe and applying the
//!   configured reset policy when histories diverged.
//! - **Upstream Sync (`upstream`)**: merges the community easyconfigs
//!   repository into the recipe repository.
//! - **Package List (`package_list`)**: parses the node-tagged list of
//!   packages kept in the stack repository.
//! - **Build Plan (`plan`, `recipes`)**: filters the list for the active node,
//!   expands recipe dependencies and orders everything topologically.
//! - **Build Engine (`engine`)**: runs EasyBuild over the plan.
//!
//! ## Execution Flow
//!
//! `update-repos`:
//!
//! 1.  Open both repositories and fetch `origin`.
//! 2.  Reconcile the node's own branch, the other nodes' branches and the
//!     main branch, each under its reset policy.
//! 3.  Optionally merge the upstream easyconfigs branch and push it.
//!
//! `build-stack`:
//!
//! 1.  Check out the node branch in both repositories.
//! 2.  Parse the package list and build the plan.
//! 3.  Verify every recipe exists, install license files, then build.

pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod git;
pub mod node;
pub mod output;
pub mod package_list;
pub mod plan;
pub mod recipes;
pub mod reconcile;
pub mod repository;
pub mod upstream;

#[cfg(test)]
mod mock_git;
#[cfg(test)]
mod plan_proptest;
