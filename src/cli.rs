//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use stack_builder::config::ConfigSearch;
use stack_builder::defaults::{EASYBUILD_CONFIG_ENV, STACK_BUILDER_CONFIG_ENV};
use stack_builder::output::OutputConfig;

use crate::commands::{self, Context};

/// Stack Builder - Keep SIB node branches in sync and build the software stack
#[derive(Parser, Debug)]
#[command(name = "stack-builder")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output
    #[arg(long, global = true, value_enum, value_name = "WHEN", default_value_t = ColorWhen::Auto)]
    color: ColorWhen,

    /// Set log level (off, error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,

    /// Stack-builder configuration file
    #[arg(long, global = true, value_name = "FILE", env = STACK_BUILDER_CONFIG_ENV)]
    config: Option<PathBuf>,

    /// EasyBuild configuration file
    #[arg(long, global = true, value_name = "FILE", env = EASYBUILD_CONFIG_ENV)]
    easybuild_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorWhen {
    Auto,
    Always,
    Never,
}

impl ColorWhen {
    fn as_str(&self) -> &'static str {
        match self {
            ColorWhen::Auto => "auto",
            ColorWhen::Always => "always",
            ColorWhen::Never => "never",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile the node branches of both repositories with origin
    #[command(visible_aliases = ["update", "ur"])]
    UpdateRepos(commands::update_repos::UpdateReposArgs),

    /// Build the software stack of the local node
    #[command(visible_aliases = ["build", "bs"])]
    BuildStack(commands::build_stack::BuildStackArgs),

    /// Show the resolved configuration
    Info(commands::info::InfoArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        init_logging(self.log_level);

        let context = Context {
            output: OutputConfig::from_env_and_flag(self.color.as_str()),
            search: ConfigSearch::new(self.config, self.easybuild_config),
        };

        match self.command {
            Commands::UpdateRepos(args) => commands::update_repos::execute(args, &context),
            Commands::BuildStack(args) => commands::build_stack::execute(args, &context),
            Commands::Info(args) => commands::info::execute(args, &context),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // A logger may already be installed when commands run inside tests.
    let _ = builder.try_init();
}
