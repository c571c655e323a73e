//! # Recipe Store
//!
//! Indexes the EasyBuild recipe files (`*.eb`) found under the robot paths
//! and answers dependency queries for the build plan.
//!
//! ## Lookup
//!
//! Robot paths are searched in configured order and the first file with a
//! given name wins, which is also what EasyBuild does. An identifier that
//! contains a directory (`g/GCC/GCC-10.3.0.eb`) only matches files whose
//! path ends with it.
//!
//! ## Dependencies
//!
//! Only three assignments of a recipe are read: `toolchain`, `dependencies`
//! and `builddependencies`. Each dependency tuple
//! `('name', 'version', 'suffix', toolchain)` is mapped to a recipe file in
//! the store, trying in order:
//!
//! 1. `name-version-<toolchain name>-<toolchain version>suffix.eb`
//! 2. `name-version suffix.eb` (no toolchain)
//! 3. the first file, in sorted order, named `name-version-*`
//!
//! A dependency with no matching file is left to EasyBuild's own robot
//! resolution and is not part of the plan.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::defaults::RECIPE_EXTENSION;
use crate::error::Result;
use crate::package_list::recipe_key;
use crate::plan::DependencyLookup;

/// A compiler toolchain as written in a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub name: String,
    pub version: String,
}

/// Toolchain of a dependency tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyToolchain {
    /// Same toolchain as the recipe.
    Inherit,
    /// `SYSTEM` or `True`: built without a toolchain.
    System,
    Explicit(Toolchain),
}

/// One dependency tuple of a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub version: String,
    pub suffix: String,
    pub toolchain: DependencyToolchain,
}

/// The parts of a recipe the plan needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeInfo {
    /// `None` for `SYSTEM` toolchain recipes.
    pub toolchain: Option<Toolchain>,
    pub dependencies: Vec<DependencySpec>,
    pub build_dependencies: Vec<DependencySpec>,
}

impl RecipeInfo {
    pub fn all_dependencies(&self) -> impl Iterator<Item = &DependencySpec> {
        self.build_dependencies.iter().chain(self.dependencies.iter())
    }
}

/// Index of recipe files under the robot paths.
#[derive(Debug)]
pub struct RecipeStore {
    /// File name to every location, in robot path order.
    files: BTreeMap<String, Vec<PathBuf>>,
    toolchain_re: Regex,
    block_re: Regex,
}

impl RecipeStore {
    /// Walks every robot path and indexes its `*.eb` files. Missing robot
    /// paths are skipped with a warning.
    pub fn open(robot_paths: &[PathBuf]) -> Result<Self> {
        let mut files: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for root in robot_paths {
            if !root.is_dir() {
                warn!("Robot path {} is not a directory, skipping", root.display());
                continue;
            }
            for entry in WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git")
            {
                let entry = entry.map_err(|e| {
                    std::io::Error::other(format!("cannot walk {}: {}", root.display(), e))
                })?;
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_file() && name.ends_with(RECIPE_EXTENSION) {
                    files
                        .entry(name.into_owned())
                        .or_default()
                        .push(entry.into_path());
                }
            }
        }

        debug!(
            "Indexed {} recipe file names under {} robot path(s)",
            files.len(),
            robot_paths.len()
        );
        Ok(Self {
            files,
            toolchain_re: Regex::new(
                r#"(?m)^\s*toolchain\s*=\s*(?:SYSTEM\b|\{[^}]*['"]name['"]\s*:\s*['"]([^'"]+)['"][^}]*['"]version['"]\s*:\s*['"]([^'"]+)['"][^}]*\})"#,
            )?,
            block_re: Regex::new(r"(?m)^\s*(builddependencies|dependencies)\s*=\s*\[")?,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of the recipe for a package identifier.
    pub fn locate(&self, identifier: &str) -> Option<&Path> {
        let file_name = format!("{}{}", recipe_key(identifier), RECIPE_EXTENSION);
        let locations = self.files.get(&file_name)?;

        if identifier.contains('/') {
            let suffix = if identifier.ends_with(RECIPE_EXTENSION) {
                identifier.to_string()
            } else {
                format!("{}{}", identifier, RECIPE_EXTENSION)
            };
            locations
                .iter()
                .find(|p| p.to_string_lossy().ends_with(&suffix))
                .map(PathBuf::as_path)
        } else {
            locations.first().map(PathBuf::as_path)
        }
    }

    /// Reads the toolchain and dependency tuples of a recipe.
    pub fn parse_recipe(&self, text: &str) -> RecipeInfo {
        let toolchain = self.toolchain_re.captures(text).and_then(|c| {
            match (c.get(1), c.get(2)) {
                (Some(name), Some(version)) => Some(Toolchain {
                    name: name.as_str().to_string(),
                    version: version.as_str().to_string(),
                }),
                _ => None,
            }
        });

        let mut info = RecipeInfo {
            toolchain,
            ..RecipeInfo::default()
        };
        for m in self.block_re.captures_iter(text) {
            let (Some(kind), Some(whole)) = (m.get(1), m.get(0)) else {
                continue;
            };
            let block = list_body(&text[whole.end()..]);
            let specs = top_level_tuples(block)
                .into_iter()
                .filter_map(|t| dependency_spec(&t))
                .collect();
            match kind.as_str() {
                "dependencies" => info.dependencies = specs,
                _ => info.build_dependencies = specs,
            }
        }
        info
    }

    /// Maps a dependency tuple to the file name of a recipe in the store.
    pub fn resolve(&self, spec: &DependencySpec, parent: Option<&Toolchain>) -> Option<String> {
        let toolchain = match &spec.toolchain {
            DependencyToolchain::Inherit => parent,
            DependencyToolchain::System => None,
            DependencyToolchain::Explicit(tc) => Some(tc),
        };

        let mut candidates = Vec::new();
        if let Some(tc) = toolchain {
            candidates.push(format!(
                "{}-{}-{}-{}{}{}",
                spec.name, spec.version, tc.name, tc.version, spec.suffix, RECIPE_EXTENSION
            ));
        }
        candidates.push(format!(
            "{}-{}{}{}",
            spec.name, spec.version, spec.suffix, RECIPE_EXTENSION
        ));
        if let Some(found) = candidates.into_iter().find(|c| self.files.contains_key(c)) {
            return Some(found);
        }

        let prefix = format!("{}-{}-", spec.name, spec.version);
        self.files
            .range(prefix.clone()..)
            .take_while(|(name, _)| name.starts_with(&prefix))
            .map(|(name, _)| name.clone())
            .find(|name| name.ends_with(&format!("{}{}", spec.suffix, RECIPE_EXTENSION)))
    }
}

impl DependencyLookup for RecipeStore {
    fn dependencies_of(&self, identifier: &str) -> Result<Vec<String>> {
        let Some(path) = self.locate(identifier) else {
            debug!("No recipe for '{}', dependencies unknown", identifier);
            return Ok(Vec::new());
        };

        let info = self.parse_recipe(&fs::read_to_string(path)?);
        let mut resolved = Vec::new();
        for spec in info.all_dependencies() {
            match self.resolve(spec, info.toolchain.as_ref()) {
                Some(file_name) => {
                    if !resolved.contains(&file_name) {
                        resolved.push(file_name);
                    }
                }
                None => warn!(
                    "{}: no recipe for dependency {} {}{}, leaving it to EasyBuild",
                    identifier, spec.name, spec.version, spec.suffix
                ),
            }
        }
        Ok(resolved)
    }
}

/// Text up to the `]` closing a list whose `[` was just consumed.
fn list_body(rest: &str) -> &str {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut comment = false;

    for (i, c) in rest.char_indices() {
        if comment {
            comment = c != '\n';
            continue;
        }
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => comment = true,
            (None, '[' | '(') => depth += 1,
            (None, ']') if depth == 0 => return &rest[..i],
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    rest
}

/// Contents of the tuples directly inside a list body.
fn top_level_tuples(body: &str) -> Vec<String> {
    let mut tuples = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut comment = false;
    let mut start = None;

    for (i, c) in body.char_indices() {
        if comment {
            comment = c != '\n';
            continue;
        }
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => comment = true,
            (None, '(' | '[') => {
                if depth == 0 && c == '(' {
                    start = Some(i + 1);
                }
                depth += 1;
            }
            (None, ')' | ']') => {
                depth = depth.saturating_sub(1);
                if depth == 0 && c == ')' {
                    if let Some(s) = start.take() {
                        tuples.push(body[s..i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    tuples
}

/// Splits on commas outside quotes and parentheses.
fn split_items(tuple: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();

    for c in tuple.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

fn string_literal(item: &str) -> Option<String> {
    let item = item.trim();
    let quote = item.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    item.strip_prefix(quote)?
        .strip_suffix(quote)
        .map(str::to_string)
}

fn dependency_spec(tuple: &str) -> Option<DependencySpec> {
    let items = split_items(tuple);
    let name = string_literal(items.first()?)?;
    let version = string_literal(items.get(1)?)?;
    let suffix = items
        .get(2)
        .and_then(|s| string_literal(s))
        .unwrap_or_default();

    let toolchain = match items.get(3).map(|s| s.trim()) {
        None => DependencyToolchain::Inherit,
        Some("SYSTEM") | Some("True") => DependencyToolchain::System,
        Some(tc) if tc.starts_with('(') => {
            let inner = split_items(tc.trim_start_matches('(').trim_end_matches(')'));
            match (
                inner.first().and_then(|s| string_literal(s)),
                inner.get(1).and_then(|s| string_literal(s)),
            ) {
                (Some(name), Some(_)) if name == "system" => DependencyToolchain::System,
                (Some(name), Some(version)) => {
                    DependencyToolchain::Explicit(Toolchain { name, version })
                }
                _ => DependencyToolchain::Inherit,
            }
        }
        Some(_) => DependencyToolchain::Inherit,
    };

    Some(DependencySpec {
        name,
        version,
        suffix,
        toolchain,
    })
}
