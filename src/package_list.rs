//! # Package List Parsing
//!
//! The package list is a UTF-8 text file in the stack repository naming, one
//! per line, the recipes to build. A line may start with node tags that
//! restrict the package to some nodes:
//!
//! ```text
//! # comments start with '#', blank lines are ignored
//! GCC-10.3.0.eb
//! "VIT","SCI" Python-3.9.5-GCCcore-10.3.0.eb
//! VIT,SCI R-4.1.0-foss-2021a
//! "VIT", "SCI", BLAST+-2.11.0-gompi-2021a.eb   # trailing comma is accepted
//! ```
//!
//! Tags are node names or abbreviations (see [`Node`]), optionally double
//! quoted and separated by commas. The identifier is the last token of the
//! line; a missing `.eb` extension is implied.
//!
//! A malformed line rejects the whole list. The error names the 1-based line.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::defaults::{PACKAGE_LIST_FILE, PACKAGE_LIST_OVERRIDE_FILE, RECIPE_EXTENSION};
use crate::error::{Error, Result};
use crate::node::Node;

/// Nodes a package is built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    Unrestricted,
    Only(BTreeSet<Node>),
}

impl Restriction {
    /// Whether any of `nodes` may build the package.
    pub fn allows_any(&self, nodes: &[Node]) -> bool {
        match self {
            Restriction::Unrestricted => true,
            Restriction::Only(set) => nodes.iter().any(|n| set.contains(n)),
        }
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Restriction::Unrestricted => f.write_str("all nodes"),
            Restriction::Only(set) => f.write_str(
                &set.iter()
                    .map(Node::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }
}

/// One package of the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEntry {
    /// Identifier as written, possibly with a directory and without `.eb`.
    pub identifier: String,
    pub name: String,
    pub version: String,
    pub restriction: Restriction,
    /// 1-based source line, `0` for entries that were not declared.
    pub line: usize,
}

impl PackageEntry {
    /// Builds an entry from an identifier, splitting name and version.
    pub fn new(identifier: &str, restriction: Restriction, line: usize) -> Self {
        let (name, version) = split_name_version(&recipe_key(identifier));
        Self {
            identifier: identifier.to_string(),
            name,
            version,
            restriction,
            line,
        }
    }

    /// The identifier's file name without `.eb`, used to compare packages.
    pub fn key(&self) -> String {
        recipe_key(&self.identifier)
    }

    /// File name of the recipe, `.eb` included.
    pub fn recipe_file_name(&self) -> String {
        format!("{}{}", self.key(), RECIPE_EXTENSION)
    }

    /// `name-version` of the installed module.
    pub fn module_key(&self) -> String {
        if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }
}

/// File name part of an identifier with one trailing `.eb` removed.
pub fn recipe_key(identifier: &str) -> String {
    let file_name = identifier.rsplit('/').next().unwrap_or(identifier);
    file_name
        .strip_suffix(RECIPE_EXTENSION)
        .unwrap_or(file_name)
        .to_string()
}

/// Splits `GCC-10.3.0` into `("GCC", "10.3.0")` at the first `-` followed by
/// a digit.
fn split_name_version(key: &str) -> (String, String) {
    let bytes = key.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
            return (key[..i].to_string(), key[i + 1..].to_string());
        }
    }
    (key.to_string(), String::new())
}

/// Parses package-list text.
pub fn parse(text: &str) -> Result<Vec<PackageEntry>> {
    let mut entries: Vec<PackageEntry> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();
        if content.is_empty() {
            continue;
        }

        let entry = parse_line(content, line)?;
        let key = entry.key();
        if let Some(first) = seen.get(&key) {
            return Err(Error::Parse {
                line,
                message: format!(
                    "duplicated package '{}' (first declared at line {})",
                    key, first
                ),
            });
        }
        seen.insert(key, line);
        entries.push(entry);
    }

    debug!("Parsed {} package list entries", entries.len());
    Ok(entries)
}

fn parse_line(content: &str, line: usize) -> Result<PackageEntry> {
    let parse_error = |message: String| Error::Parse { line, message };

    let (prefix, identifier) = match content.rfind(char::is_whitespace) {
        Some(pos) => (content[..pos].trim(), content[pos..].trim()),
        None => ("", content),
    };

    if identifier.contains('"') || identifier.contains(',') {
        return Err(parse_error(format!(
            "missing or malformed package identifier '{}'",
            identifier
        )));
    }

    let restriction = if prefix.is_empty() {
        Restriction::Unrestricted
    } else {
        let mut nodes = BTreeSet::new();
        for tag in split_tags(prefix).map_err(parse_error)? {
            let node = Node::from_synonym(&tag)
                .ok_or_else(|| parse_error(format!("unknown node tag '{}'", tag)))?;
            nodes.insert(node);
        }
        Restriction::Only(nodes)
    };

    Ok(PackageEntry::new(identifier, restriction, line))
}

/// Splits `"VIT", "SCI",` into `["VIT", "SCI"]`.
fn split_tags(prefix: &str) -> std::result::Result<Vec<String>, String> {
    let mut tags = Vec::new();
    let mut chars = prefix.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let tag = if chars.next_if_eq(&'"').is_some() {
            let mut tag = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(c) => tag.push(c),
                    None => return Err(format!("unterminated quote in node tags '{}'", prefix)),
                }
            }
            tag
        } else {
            let mut tag = String::new();
            while let Some(c) = chars.next_if(|c| *c != ',') {
                if c == '"' {
                    return Err(format!("misplaced quote in node tags '{}'", prefix));
                }
                tag.push(c);
            }
            tag
        };

        let tag = tag.trim();
        if tag.is_empty() {
            return Err(format!("empty node tag in '{}'", prefix));
        }
        tags.push(tag.to_string());

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None | Some(',') => {}
            Some(c) => {
                return Err(format!(
                    "expected ',' between node tags, found '{}' in '{}'",
                    c, prefix
                ))
            }
        }
    }

    Ok(tags)
}

/// Finds the package list in the stack repository: `package_list.txt` first,
/// then `sib_stack_package_list.txt`.
pub fn locate(stack_repo: &Path) -> Result<PathBuf> {
    [PACKAGE_LIST_OVERRIDE_FILE, PACKAGE_LIST_FILE]
        .iter()
        .map(|name| stack_repo.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| Error::Repo {
            path: stack_repo.to_path_buf(),
            message: format!(
                "no package list found (looked for {} and {})",
                PACKAGE_LIST_OVERRIDE_FILE, PACKAGE_LIST_FILE
            ),
        })
}

/// Reads and parses a package list file.
pub fn load(path: &Path) -> Result<Vec<PackageEntry>> {
    parse(&fs::read_to_string(path)?)
}
