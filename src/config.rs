//! # Configuration Loading and Validation
//!
//! This module reads the two `.cfg` files the tool depends on:
//!
//! - the **stack-builder settings** (`config_stackbuilder.cfg`): node identity,
//!   repository locations, reset policies and node scopes;
//! - the **EasyBuild configuration** (`config.cfg`): build, source and install
//!   paths plus the robot paths where recipe files are searched.
//!
//! ## File Syntax
//!
//! Both files are INI-style `key = value` files, parsed with `rust-ini`.
//! `#` and `;` start comment lines, `[section]` headers are allowed (keys are
//! read from every section), and values may be wrapped in double quotes.
//! Keys are normalised to lowercase with `-` replaced by `_`, so
//! `robot-paths` and `robot_paths` are the same key.
//!
//! ## Search Order
//!
//! The settings file is searched in this order, first found wins:
//!
//! 1. an explicit path (`--config` or `STACKBUILDER_CONFIGFILES`), which must exist;
//! 2. `config_stackbuilder.cfg` next to the EasyBuild configuration file
//!    named by `EASYBUILD_CONFIGFILES`;
//! 3. `~/.config/easybuild/config_stackbuilder.cfg`.
//!
//! The EasyBuild file is either explicit (`--easybuild-config` or
//! `EASYBUILD_CONFIGFILES`) or `~/.config/easybuild/config.cfg`. It is optional
//! at load time; commands that drive the build engine require it through
//! [`Config::engine`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};
use log::debug;
use serde::Serialize;

use crate::defaults::{default_config_dir, EASYBUILD_CONFIG_FILE, STACK_BUILDER_CONFIG_FILE};
use crate::error::{Error, Result};
use crate::node::{Node, ResetPolicy};

const SETTINGS_REQUIRED_KEYS: [&str; 5] = [
    "sib_software_stack_repo",
    "sib_easyconfigs_repo",
    "sib_node",
    "allow_reset_node_branch",
    "allow_reset_other_nodes_branch",
];

const ENGINE_REQUIRED_KEYS: [&str; 4] = ["buildpath", "sourcepath", "installpath", "robot_paths"];

/// Where configuration files are looked up.
#[derive(Debug, Clone)]
pub struct ConfigSearch {
    /// Explicit stack-builder settings file.
    pub explicit: Option<PathBuf>,
    /// Explicit EasyBuild configuration file.
    pub easybuild_explicit: Option<PathBuf>,
    /// Well-known directory searched last.
    pub default_dir: PathBuf,
}

impl ConfigSearch {
    /// Creates a search using `~/.config/easybuild` as the well-known directory.
    pub fn new(explicit: Option<PathBuf>, easybuild_explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            easybuild_explicit,
            default_dir: default_config_dir(),
        }
    }

    /// Replaces the well-known directory.
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = dir.into();
        self
    }

    /// Candidate locations for the settings file, in search order.
    pub fn settings_candidates(&self) -> Vec<PathBuf> {
        if let Some(explicit) = &self.explicit {
            return vec![expand_tilde(&explicit.to_string_lossy())];
        }

        let mut candidates = Vec::new();
        if let Some(easybuild) = &self.easybuild_explicit {
            let easybuild = expand_tilde(&easybuild.to_string_lossy());
            if let Some(dir) = easybuild.parent() {
                candidates.push(dir.join(STACK_BUILDER_CONFIG_FILE));
            }
        }
        let default = self.default_dir.join(STACK_BUILDER_CONFIG_FILE);
        if !candidates.contains(&default) {
            candidates.push(default);
        }
        candidates
    }

    /// Resolves the settings file.
    pub fn locate_settings(&self) -> Result<PathBuf> {
        let candidates = self.settings_candidates();

        if self.explicit.is_some() {
            let path = &candidates[0];
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(Error::config(
                "the explicitly requested settings file is missing or cannot be accessed",
                Some(path.clone()),
            ));
        }

        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| {
                Error::config(
                    format!(
                        "cannot find a stack-builder settings file. Searched:\n{}",
                        candidates
                            .iter()
                            .map(|p| format!("  -> {}", p.display()))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ),
                    None,
                )
            })
    }

    /// Resolves the EasyBuild configuration file, if there is one.
    pub fn locate_easybuild(&self) -> Result<Option<PathBuf>> {
        if let Some(explicit) = &self.easybuild_explicit {
            let path = expand_tilde(&explicit.to_string_lossy());
            if path.is_file() {
                return Ok(Some(path));
            }
            return Err(Error::config(
                "the EasyBuild configuration file is missing or cannot be accessed",
                Some(path),
            ));
        }

        let default = self.default_dir.join(EASYBUILD_CONFIG_FILE);
        Ok(default.is_file().then_some(default))
    }
}

/// Stack-builder settings: node identity, repositories and reset policies.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub software_stack_repo: PathBuf,
    pub easyconfigs_repo: PathBuf,
    pub node: Node,
    pub reset_node_branch: ResetPolicy,
    pub reset_other_nodes_branch: ResetPolicy,
    /// Other nodes whose branches are reconciled. Never contains `node`.
    pub other_nodes: Vec<Node>,
    /// Nodes whose optional packages are built in addition to `node`'s.
    /// Never contains `node`.
    pub optional_software: Vec<Node>,
}

impl Settings {
    /// Parses settings from the text of a `config_stackbuilder.cfg` file.
    ///
    /// `file` is only used to name the file in error messages.
    pub fn parse(text: &str, file: Option<&Path>) -> Result<Self> {
        let values = read_values(text, file)?;
        require_keys(&values, &SETTINGS_REQUIRED_KEYS, file)?;

        let node: Node = parse_value(&values, "sib_node", file)?;
        let reset_node_branch = parse_value(&values, "allow_reset_node_branch", file)?;
        let reset_other_nodes_branch =
            parse_value(&values, "allow_reset_other_nodes_branch", file)?;

        let other_nodes = match values.get("other_nodes") {
            Some(value) => parse_node_list(value, "other_nodes", file)?
                .into_iter()
                .filter(|n| *n != node)
                .collect(),
            None => node.others(),
        };
        let optional_software = match values.get("optional_software") {
            Some(value) => parse_node_list(value, "optional_software", file)?
                .into_iter()
                .filter(|n| *n != node)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            software_stack_repo: path_value(&values, "sib_software_stack_repo", file)?,
            easyconfigs_repo: path_value(&values, "sib_easyconfigs_repo", file)?,
            node,
            reset_node_branch,
            reset_other_nodes_branch,
            other_nodes,
            optional_software,
        })
    }
}

/// EasyBuild settings needed to locate recipes and drive the build engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSettings {
    pub buildpath: PathBuf,
    pub sourcepath: PathBuf,
    pub installpath: PathBuf,
    pub robot_paths: Vec<PathBuf>,
    pub job_cores: usize,
    pub optarch: Option<String>,
}

impl EngineSettings {
    /// Parses the relevant values of an EasyBuild `config.cfg`.
    pub fn parse(text: &str, file: Option<&Path>) -> Result<Self> {
        let values = read_values(text, file)?;
        require_keys(&values, &ENGINE_REQUIRED_KEYS, file)?;

        let robot_paths: Vec<PathBuf> = split_list(&values["robot_paths"])
            .iter()
            .map(|p| expand_tilde(p))
            .collect();
        if robot_paths.is_empty() {
            return Err(Error::config(
                "'robot_paths' must list at least one directory",
                file.map(Path::to_path_buf),
            ));
        }

        let job_cores = match values.get("job_cores") {
            Some(value) => value.parse().map_err(|_| {
                Error::config(
                    format!("'job_cores' must be a non-negative integer, got '{}'", value),
                    file.map(Path::to_path_buf),
                )
            })?,
            None => 0,
        };

        Ok(Self {
            buildpath: path_value(&values, "buildpath", file)?,
            sourcepath: path_value(&values, "sourcepath", file)?,
            installpath: path_value(&values, "installpath", file)?,
            robot_paths,
            job_cores,
            optarch: values.get("optarch").filter(|v| !v.is_empty()).cloned(),
        })
    }
}

/// The fully resolved configuration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub settings: Settings,
    pub settings_file: PathBuf,
    pub engine: Option<EngineSettings>,
    pub engine_file: Option<PathBuf>,
}

impl Config {
    /// Loads and validates the configuration found through `search`.
    pub fn load(search: &ConfigSearch) -> Result<Self> {
        let settings_file = search.locate_settings()?;
        debug!("Loading settings from {}", settings_file.display());
        let text = read_file(&settings_file)?;
        let settings = Settings::parse(&text, Some(&settings_file))?;

        let engine_file = search.locate_easybuild()?;
        let engine = match &engine_file {
            Some(path) => {
                debug!("Loading EasyBuild configuration from {}", path.display());
                let text = read_file(path)?;
                Some(EngineSettings::parse(&text, Some(path))?)
            }
            None => None,
        };

        Ok(Self {
            settings,
            settings_file,
            engine,
            engine_file,
        })
    }

    /// The EasyBuild settings, required by the build path.
    pub fn engine(&self) -> Result<&EngineSettings> {
        self.engine.as_ref().ok_or_else(|| {
            Error::config(
                format!(
                    "no EasyBuild configuration file found; set {} or create {}",
                    crate::defaults::EASYBUILD_CONFIG_ENV,
                    default_config_dir().join(EASYBUILD_CONFIG_FILE).display()
                ),
                None,
            )
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        Error::config(
            format!("cannot read file: {}", e),
            Some(path.to_path_buf()),
        )
    })
}

/// Reads every `key = value` pair of every section into a flat map.
fn read_values(text: &str, file: Option<&Path>) -> Result<BTreeMap<String, String>> {
    let option = ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(text, option).map_err(|e| {
        Error::config(
            format!("malformed configuration file: {}", e),
            file.map(Path::to_path_buf),
        )
    })?;

    let mut values = BTreeMap::new();
    for (_section, properties) in ini.iter() {
        for (key, value) in properties.iter() {
            let key = key.trim().to_lowercase().replace('-', "_");
            let value = value.trim().trim_matches('"').trim().to_string();
            values.insert(key, value);
        }
    }
    Ok(values)
}

fn require_keys(
    values: &BTreeMap<String, String>,
    required: &[&str],
    file: Option<&Path>,
) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| !values.contains_key(*key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::config(
        format!("missing required key(s): {}", missing.join(", ")),
        file.map(Path::to_path_buf),
    ))
}

fn parse_value<T>(values: &BTreeMap<String, String>, key: &str, file: Option<&Path>) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    values[key].parse().map_err(|message| {
        Error::config(format!("'{}': {}", key, message), file.map(Path::to_path_buf))
    })
}

fn path_value(values: &BTreeMap<String, String>, key: &str, file: Option<&Path>) -> Result<PathBuf> {
    let value = values[key].as_str();
    if value.is_empty() {
        return Err(Error::config(
            format!("'{}' must not be empty", key),
            file.map(Path::to_path_buf),
        ));
    }
    Ok(expand_tilde(value))
}

fn parse_node_list(value: &str, key: &str, file: Option<&Path>) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for item in split_list(value) {
        let node: Node = item.parse().map_err(|message| {
            Error::config(format!("'{}': {}", key, message), file.map(Path::to_path_buf))
        })?;
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Splits a list value on the first separator present among `:`, `;`, `,`.
pub fn split_list(value: &str) -> Vec<String> {
    let value = value.trim();
    let separator = [':', ';', ','].into_iter().find(|sep| value.contains(*sep));
    let items: Vec<&str> = match separator {
        Some(sep) => value.split(sep).collect(),
        None => vec![value],
    };
    items
        .into_iter()
        .map(|item| item.trim().trim_matches('"').trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
