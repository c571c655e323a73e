//! # Info Command Implementation
//!
//! Prints the resolved configuration: which files were loaded, the node
//! identity, repository locations, reset policies and the EasyBuild paths.
//! Read-only.

use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;

use stack_builder::config::Config;
use stack_builder::output::OutputConfig;

use super::{Context, OutputFormat};

/// Show the resolved configuration
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub fn execute(args: InfoArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", render(&config, &context.output)),
    }
    Ok(())
}

fn join<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.iter().map(T::to_string).collect::<Vec<_>>().join(", ")
    }
}

fn render(config: &Config, out: &OutputConfig) -> String {
    let s = &config.settings;
    let mut text = String::new();

    let _ = writeln!(text, "{}", out.heading("Stack builder"));
    let _ = writeln!(text, "  settings file:      {}", config.settings_file.display());
    let _ = writeln!(text, "  node:               {}", s.node);
    let _ = writeln!(text, "  recipe repository:  {}", s.easyconfigs_repo.display());
    let _ = writeln!(text, "  stack repository:   {}", s.software_stack_repo.display());
    let _ = writeln!(text, "  reset own branch:   {}", s.reset_node_branch);
    let _ = writeln!(text, "  reset other nodes:  {}", s.reset_other_nodes_branch);
    let _ = writeln!(text, "  other nodes:        {}", join(&s.other_nodes));
    let _ = writeln!(text, "  optional software:  {}", join(&s.optional_software));

    let _ = writeln!(text, "{}", out.heading("EasyBuild"));
    match (&config.engine, &config.engine_file) {
        (Some(engine), Some(file)) => {
            let _ = writeln!(text, "  config file:        {}", file.display());
            let _ = writeln!(text, "  buildpath:          {}", engine.buildpath.display());
            let _ = writeln!(text, "  sourcepath:         {}", engine.sourcepath.display());
            let _ = writeln!(text, "  installpath:        {}", engine.installpath.display());
            let paths: Vec<String> = engine
                .robot_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            let _ = writeln!(text, "  robot paths:        {}", join(&paths));
            let _ = writeln!(text, "  job cores:          {}", engine.job_cores);
            if let Some(optarch) = &engine.optarch {
                let _ = writeln!(text, "  optarch:            {}", optarch);
            }
        }
        _ => {
            let _ = writeln!(text, "  {}", out.dim("no configuration file found"));
        }
    }
    text
}
