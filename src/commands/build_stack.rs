//! # Build Stack Command Implementation
//!
//! Builds the software stack of the local node.
//!
//! ## Functionality
//!
//! - **Checkout**: the node branch is checked out in both repositories for
//!   the whole run and the previous checkout restored afterwards.
//! - **Planning**: the package list is filtered for the node (plus the
//!   optional software selection), recipe dependencies are expanded and the
//!   result ordered so that dependencies come first.
//! - **Summary**: plan order, why each entry is there, what is already
//!   installed and which recipes are missing. `--tree` adds the dependency
//!   tree; `--format json` prints the same data as JSON.
//! - **Build**: every recipe is verified, license files are installed, then
//!   EasyBuild runs once per entry in plan order. Its scratch directories are
//!   cleaned before each build and after each successful one.
//!
//! `--summary` stops after the summary, `--dry-run` after the recipe check.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use ptree::TreeItem;
use serde::Serialize;

use stack_builder::config::Config;
use stack_builder::defaults::default_license_dir;
use stack_builder::engine::{
    install_license_files, needs_build, run_plan, verify_recipes, BuildReport, BuildStatus,
    EasyBuildEngine, InstalledModules, ScratchDirs,
};
use stack_builder::error;
use stack_builder::output::{Marker, OutputConfig};
use stack_builder::package_list::{self, Restriction};
use stack_builder::plan::{self, BuildPlan, Origin, PlanEntry};
use stack_builder::recipes::RecipeStore;
use stack_builder::repository::{DefaultGitOperations, GitOperations, RepoSet};

use super::{Context, OutputFormat};

/// Build the software stack of the local node
#[derive(Args, Debug)]
pub struct BuildStackArgs {
    /// Print the build plan and stop
    #[arg(short, long)]
    pub summary: bool,

    /// Verify that every recipe exists, without building
    #[arg(short, long)]
    pub dry_run: bool,

    /// Build entries even when their module is already installed
    #[arg(long)]
    pub rebuild: bool,

    /// Also print the dependency tree
    #[arg(long)]
    pub tree: bool,

    /// Output format of the summary
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Package list to use instead of the one in the stack repository
    #[arg(long, value_name = "FILE")]
    pub package_list: Option<PathBuf>,
}

pub fn execute(args: BuildStackArgs, context: &Context) -> Result<()> {
    let config = context.load_config()?;
    let engine_settings = config.engine().context("build-stack needs EasyBuild settings")?;
    let git: Arc<dyn GitOperations> = Arc::new(DefaultGitOperations);
    let repos = RepoSet::open(&config.settings, git)?;
    let branch = config.settings.node.branch_name();

    let report = repos
        .with_branch(branch, |repos| {
            let store = RecipeStore::open(&engine_settings.robot_paths)?;
            let installed = InstalledModules::scan(&engine_settings.installpath)?;
            run(&args, &config, repos, &store, &installed, &context.output)
        })
        .with_context(|| format!("build-stack failed on branch '{}'", branch))?;

    if let Some(report) = report {
        print!("{}", render_build_report(&report, &context.output));
        if report.has_failures() {
            bail!(
                "{} of {} package(s) were not built",
                report.count(BuildStatus::is_failure),
                report.outcomes.len()
            );
        }
    }
    Ok(())
}

/// Everything that happens with the node branch checked out. Returns the
/// build report when the engine ran.
fn run(
    args: &BuildStackArgs,
    config: &Config,
    repos: &RepoSet,
    store: &RecipeStore,
    installed: &InstalledModules,
    out: &OutputConfig,
) -> error::Result<Option<BuildReport>> {
    let settings = &config.settings;
    let list_path = match &args.package_list {
        Some(path) => path.clone(),
        None => package_list::locate(repos.stack.path())?,
    };
    let entries = package_list::load(&list_path)?;
    let plan = plan::build(&entries, settings.node, &settings.optional_software, store)?;

    let mut located = BTreeMap::new();
    let mut missing = Vec::new();
    for entry in plan.iter().filter(|e| needs_build(e, installed, args.rebuild)) {
        match store.locate(&entry.entry.identifier) {
            Some(path) => {
                located.insert(entry.key(), path.to_path_buf());
            }
            None => missing.push(entry.entry.recipe_file_name()),
        }
    }

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&PlanJson::new(&plan, installed, &missing))?
        ),
        OutputFormat::Text => {
            println!("{} Package list: {}", out.marker(Marker::Ok), list_path.display());
            print!(
                "{}",
                render_summary(&plan, installed, args.rebuild, &located, &missing, out)
            );
            if args.tree {
                print!("{}", render_tree(&plan)?);
            }
        }
    }

    if args.summary {
        return Ok(None);
    }

    let recipes = verify_recipes(&plan, store, installed, args.rebuild)?;
    if args.dry_run {
        println!(
            "{} All {} recipe(s) to build were found, nothing built (dry run)",
            out.marker(Marker::Ok),
            recipes.len()
        );
        return Ok(None);
    }

    let licenses = install_license_files(repos.stack.path(), &default_license_dir())?;
    if !licenses.is_empty() {
        println!("{} Installed {} license file(s)", out.marker(Marker::Ok), licenses.len());
    }

    let mut engine = EasyBuildEngine::new()
        .with_config_file(config.engine_file.clone())
        .with_scratch(ScratchDirs::new(&config.engine()?.buildpath));
    Ok(Some(run_plan(&plan, &recipes, &mut engine, installed, args.rebuild)))
}

/// Plan order, origin, installation state and missing recipes. Entries to
/// build that have a path in `recipes` get it on the line below.
pub fn render_summary(
    plan: &BuildPlan,
    installed: &InstalledModules,
    rebuild: bool,
    recipes: &BTreeMap<String, PathBuf>,
    missing: &[String],
    out: &OutputConfig,
) -> String {
    let mut text = String::new();
    let already = plan.iter().filter(|e| !needs_build(e, installed, rebuild)).count();
    let _ = writeln!(
        text,
        "{}",
        out.heading(&format!(
            "Build plan for {}: {} package(s), {} already installed",
            plan.node,
            plan.len(),
            already
        ))
    );
    if !plan.selection.is_empty() {
        let optional: Vec<&str> = plan.selection.iter().map(|n| n.as_str()).collect();
        let _ = writeln!(text, "Optional software from: {}", optional.join(", "));
    }

    for (index, entry) in plan.iter().enumerate() {
        let to_build = needs_build(entry, installed, rebuild);
        let marker = if to_build { Marker::Build } else { Marker::Installed };
        let mut notes = String::new();
        if let Restriction::Only(_) = entry.entry.restriction {
            let _ = write!(notes, " [{}]", entry.entry.restriction);
        }
        if let Origin::Dependency { required_by } = &entry.origin {
            let _ = write!(notes, " (required by {})", required_by);
        }
        let _ = writeln!(
            text,
            "{:>4}. {} {}{}",
            index + 1,
            out.marker(marker),
            entry.key(),
            out.dim(&notes)
        );
        if let Some(path) = recipes.get(&entry.key()).filter(|_| to_build) {
            let _ = writeln!(text, "        {}", out.dim(&path.display().to_string()));
        }
    }

    if !missing.is_empty() {
        let _ = writeln!(
            text,
            "{} Missing recipes ({}):",
            out.marker(Marker::Warning),
            missing.len()
        );
        for recipe in missing {
            let _ = writeln!(text, "    {}", recipe);
        }
    }
    text
}

/// Outcome of every entry of a real build.
pub fn render_build_report(report: &BuildReport, out: &OutputConfig) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "\n{}", out.heading("Build summary"));
    for outcome in &report.outcomes {
        let marker = match outcome.status {
            BuildStatus::Built => Marker::Ok,
            BuildStatus::AlreadyInstalled => Marker::Installed,
            BuildStatus::Failed { .. } => Marker::Failed,
            BuildStatus::Skipped { .. } => Marker::Skipped,
        };
        let _ = writeln!(
            text,
            "  {} {}: {} {}",
            out.marker(marker),
            outcome.key,
            outcome.status,
            out.dim(&format!("({:.1?})", outcome.elapsed))
        );
    }
    let _ = writeln!(
        text,
        "{} built, {} already installed, {} failed, {} skipped in {:.1?}",
        report.count(|s| *s == BuildStatus::Built),
        report.count(|s| *s == BuildStatus::AlreadyInstalled),
        report.count(|s| matches!(s, BuildStatus::Failed { .. })),
        report.count(|s| matches!(s, BuildStatus::Skipped { .. })),
        report.elapsed
    );
    text
}

#[derive(Serialize)]
struct PlanJson<'a> {
    node: String,
    selection: Vec<String>,
    entries: Vec<PlanEntryJson<'a>>,
    missing_recipes: &'a [String],
}

#[derive(Serialize)]
struct PlanEntryJson<'a> {
    key: String,
    #[serde(flatten)]
    entry: &'a PlanEntry,
    installed: bool,
}

impl<'a> PlanJson<'a> {
    fn new(plan: &'a BuildPlan, installed: &InstalledModules, missing: &'a [String]) -> Self {
        Self {
            node: plan.node.to_string(),
            selection: plan.selection.iter().map(|n| n.to_string()).collect(),
            entries: plan
                .iter()
                .map(|entry| PlanEntryJson {
                    key: entry.key(),
                    entry,
                    installed: installed.contains(entry),
                })
                .collect(),
            missing_recipes: missing,
        }
    }
}

/// Dependency tree node for ptree rendering.
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

fn tree_node(plan: &BuildPlan, positions: &HashMap<String, usize>, index: usize) -> TreeNode {
    let entry = &plan.entries[index];
    TreeNode {
        label: entry.key(),
        children: entry
            .dependencies
            .iter()
            .filter_map(|d| positions.get(d))
            .map(|&i| tree_node(plan, positions, i))
            .collect(),
    }
}

/// The plan as a tree rooted at the node, with every entry nothing else
/// depends on as a top-level child.
fn dependency_tree(plan: &BuildPlan) -> TreeNode {
    let positions: HashMap<String, usize> = plan
        .iter()
        .enumerate()
        .map(|(i, e)| (e.key(), i))
        .collect();
    let required: std::collections::HashSet<&String> =
        plan.iter().flat_map(|e| e.dependencies.iter()).collect();

    TreeNode {
        label: plan.node.to_string(),
        children: plan
            .iter()
            .enumerate()
            .filter(|(_, e)| !required.contains(&e.key()))
            .map(|(i, _)| tree_node(plan, &positions, i))
            .collect(),
    }
}

fn render_tree(plan: &BuildPlan) -> error::Result<String> {
    let mut buffer = Vec::new();
    ptree::write_tree(&dependency_tree(plan), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
