//! # CLI Command Implementations
//!
//! Each subcommand lives in its own file with an `Args` struct derived with
//! `clap` and an `execute` function that calls into the `stack_builder`
//! library. Library errors are wrapped with `anyhow` context naming the file
//! or repository involved.

pub mod build_stack;
pub mod completions;
pub mod info;
pub mod update_repos;

use anyhow::{Context as _, Result};
use clap::ValueEnum;

use stack_builder::config::{Config, ConfigSearch};
use stack_builder::output::OutputConfig;

/// State shared by every command, built from the global flags.
#[derive(Debug)]
pub struct Context {
    pub output: OutputConfig,
    pub search: ConfigSearch,
}

impl Context {
    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.search).context("Failed to load configuration")
    }
}

/// Report format of `build-stack` and `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
