//! # Nodes and Reset Policies
//!
//! The participating institutions and the reset policy values are closed
//! sets. Both are represented as enums so that an unrecognized value is
//! rejected when the configuration or the package list is read, never deep
//! inside reconciliation or planning.
//!
//! Each node and policy accepts a few synonyms, matched case-insensitively:
//!
//! | Value       | Accepted spellings                  |
//! |-------------|-------------------------------------|
//! | `ubelix`    | `ubelix`, `ube`                     |
//! | `ibu`       | `ibu`                               |
//! | `scicore`   | `scicore`, `sci`                    |
//! | `vitalit`   | `vitalit`, `vital-it`, `vit`        |
//! | `yes`       | `yes`, `y`, `true`                  |
//! | `no`        | `no`, `n`, `false`                  |
//! | `interactive` | `interactive`                     |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A participating institution with its own branch of the shared repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Ubelix,
    Ibu,
    Scicore,
    Vitalit,
}

impl Node {
    /// Every node, in enumeration order.
    pub const ALL: [Node; 4] = [Node::Ubelix, Node::Ibu, Node::Scicore, Node::Vitalit];

    /// Canonical lowercase name, also used as the node's branch name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Ubelix => "ubelix",
            Node::Ibu => "ibu",
            Node::Scicore => "scicore",
            Node::Vitalit => "vitalit",
        }
    }

    /// Name of the node's working branch in both repositories.
    pub fn branch_name(&self) -> &'static str {
        self.as_str()
    }

    /// All accepted spellings of this node, canonical name first.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            Node::Ubelix => &["ubelix", "ube"],
            Node::Ibu => &["ibu"],
            Node::Scicore => &["scicore", "sci"],
            Node::Vitalit => &["vitalit", "vital-it", "vit"],
        }
    }

    /// Every node except `self`, in enumeration order.
    pub fn others(&self) -> Vec<Node> {
        Node::ALL.into_iter().filter(|n| n != self).collect()
    }

    /// Look up a node by any of its synonyms.
    pub fn from_synonym(value: &str) -> Option<Node> {
        let value = value.trim();
        Node::ALL.into_iter().find(|node| {
            node.synonyms()
                .iter()
                .any(|synonym| synonym.eq_ignore_ascii_case(value))
        })
    }

    fn accepted_values() -> String {
        Node::ALL
            .iter()
            .map(|node| format!("{}: {}", node, node.synonyms().join(", ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Node {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Node::from_synonym(s).ok_or_else(|| {
            format!(
                "unknown node name '{}'. Accepted values are: {}",
                s.trim(),
                Node::accepted_values()
            )
        })
    }
}

/// How a diverged branch is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    /// Ask through the confirmation collaborator.
    Interactive,
    /// Reset to the remote without asking. The reset is still reported.
    Yes,
    /// Never reset; the branch is reported as skipped.
    No,
}

impl ResetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPolicy::Interactive => "interactive",
            ResetPolicy::Yes => "yes",
            ResetPolicy::No => "no",
        }
    }

    fn synonyms(&self) -> &'static [&'static str] {
        match self {
            ResetPolicy::Interactive => &["interactive"],
            ResetPolicy::Yes => &["yes", "y", "true"],
            ResetPolicy::No => &["no", "n", "false"],
        }
    }
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        [ResetPolicy::Interactive, ResetPolicy::Yes, ResetPolicy::No]
            .into_iter()
            .find(|policy| {
                policy
                    .synonyms()
                    .iter()
                    .any(|synonym| synonym.eq_ignore_ascii_case(value))
            })
            .ok_or_else(|| {
                format!(
                    "unknown reset policy '{}'. Accepted values are: yes, y, true; no, n, false; interactive",
                    value
                )
            })
    }
}
