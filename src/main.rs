//! # Stack Builder CLI
//!
//! Binary entry point of the `stack-builder` tool: parses arguments with
//! `clap` and dispatches to the command implementations. The work itself is
//! done by the `stack_builder` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
