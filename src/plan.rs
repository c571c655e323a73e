//! # Build Plan Construction
//!
//! Turns the parsed package list into an ordered, node-filtered build plan.
//!
//! ## Process
//!
//! 1.  **Filtering**: keep the entries that are unrestricted or restricted to
//!     the active node or a node of the optional selection.
//!
//! 2.  **Dependency Expansion**: walk the dependencies of every kept entry
//!     breadth-first through a [`DependencyLookup`]. Dependencies are pulled in
//!     regardless of node restriction. A dependency that is declared in the
//!     list but was filtered out is reused with its declared position; an
//!     undeclared dependency becomes a new unrestricted entry placed after all
//!     declared ones, in discovery order.
//!
//! 3.  **Ordering**: Kahn's algorithm, with a min-heap on declared position so
//!     that entries not constrained by a dependency keep their list order.
//!
//! 4.  **Cycle Detection**: if entries remain once the heap is empty, the
//!     remaining graph contains a cycle, which is reported as `a -> b -> a`.
//!
//! Identical inputs always produce identical plans.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};

use log::debug;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::package_list::{recipe_key, PackageEntry, Restriction};

/// Answers "what does this package depend on?".
pub trait DependencyLookup {
    /// Identifiers of the direct dependencies of `identifier`.
    fn dependencies_of(&self, identifier: &str) -> Result<Vec<String>>;
}

/// In-memory dependency graph keyed by recipe key.
impl DependencyLookup for BTreeMap<String, Vec<String>> {
    fn dependencies_of(&self, identifier: &str) -> Result<Vec<String>> {
        Ok(self
            .get(identifier)
            .or_else(|| self.get(&recipe_key(identifier)))
            .cloned()
            .unwrap_or_default())
    }
}

/// Why an entry is in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Selected from the package list.
    Listed,
    /// Pulled in as a dependency of `required_by` (a recipe key).
    Dependency { required_by: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub entry: PackageEntry,
    pub origin: Origin,
    /// Recipe keys of the direct dependencies, all present earlier in the plan.
    pub dependencies: Vec<String>,
}

impl PlanEntry {
    pub fn key(&self) -> String {
        self.entry.key()
    }
}

/// Ordered list of packages to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub node: Node,
    pub selection: Vec<Node>,
    pub entries: Vec<PlanEntry>,
}

impl BuildPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(PlanEntry::key).collect()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }
}

struct Candidate {
    entry: PackageEntry,
    origin: Origin,
    rank: usize,
    dependencies: Vec<usize>,
}

/// Builds the plan for `active_node` and the nodes of `optional_selection`.
pub fn build<L>(
    entries: &[PackageEntry],
    active_node: Node,
    optional_selection: &[Node],
    lookup: &L,
) -> Result<BuildPlan>
where
    L: DependencyLookup + ?Sized,
{
    let mut selection = vec![active_node];
    selection.extend(optional_selection.iter().filter(|n| **n != active_node));

    let declared: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(rank, e)| (e.key(), rank))
        .collect();

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<usize> = VecDeque::new();

    for (rank, entry) in entries.iter().enumerate() {
        if entry.restriction.allows_any(&selection) {
            index.insert(entry.key(), candidates.len());
            queue.push_back(candidates.len());
            candidates.push(Candidate {
                entry: entry.clone(),
                origin: Origin::Listed,
                rank,
                dependencies: Vec::new(),
            });
        }
    }

    let mut undeclared = 0;
    while let Some(current) = queue.pop_front() {
        let current_key = candidates[current].entry.key();
        let dependencies = lookup.dependencies_of(&candidates[current].entry.identifier)?;

        for dependency in dependencies {
            let key = recipe_key(&dependency);
            if key.is_empty() {
                return Err(Error::Plan {
                    message: format!("empty dependency identifier for '{}'", current_key),
                });
            }

            let target = match index.get(&key) {
                Some(&existing) => existing,
                None => {
                    let (entry, rank) = match declared.get(&key) {
                        Some(&rank) => (entries[rank].clone(), rank),
                        None => {
                            undeclared += 1;
                            debug!("'{}' requires undeclared '{}'", current_key, key);
                            (
                                PackageEntry::new(&dependency, Restriction::Unrestricted, 0),
                                entries.len() + undeclared - 1,
                            )
                        }
                    };
                    let id = candidates.len();
                    index.insert(key, id);
                    queue.push_back(id);
                    candidates.push(Candidate {
                        entry,
                        origin: Origin::Dependency {
                            required_by: current_key.clone(),
                        },
                        rank,
                        dependencies: Vec::new(),
                    });
                    id
                }
            };

            if !candidates[current].dependencies.contains(&target) {
                candidates[current].dependencies.push(target);
            }
        }
    }

    let order = topological_order(&candidates)?;

    let entries = order
        .into_iter()
        .map(|i| {
            let c = &candidates[i];
            PlanEntry {
                entry: c.entry.clone(),
                origin: c.origin.clone(),
                dependencies: c
                    .dependencies
                    .iter()
                    .map(|d| candidates[*d].entry.key())
                    .collect(),
            }
        })
        .collect();

    Ok(BuildPlan {
        node: active_node,
        selection: selection[1..].to_vec(),
        entries,
    })
}

/// Kahn's algorithm with declared rank as tie-break.
fn topological_order(candidates: &[Candidate]) -> Result<Vec<usize>> {
    let mut in_degree: Vec<usize> = candidates.iter().map(|c| c.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
    for (i, c) in candidates.iter().enumerate() {
        for &d in &c.dependencies {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse((candidates[i].rank, i)))
        .collect();

    let mut order = Vec::with_capacity(candidates.len());
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse((candidates[dependent].rank, dependent)));
            }
        }
    }

    if order.len() < candidates.len() {
        let done: HashSet<usize> = order.into_iter().collect();
        return Err(Error::CyclicDependency {
            cycle: find_cycle(candidates, &done),
        });
    }
    Ok(order)
}

/// Walks unfinished nodes, always following the lowest-ranked unfinished
/// dependency, until a node repeats. Every unfinished node has at least one
/// unfinished dependency, so the walk always closes a cycle.
fn find_cycle(candidates: &[Candidate], done: &HashSet<usize>) -> String {
    let remaining = |i: &usize| !done.contains(i);

    let Some(start) = (0..candidates.len())
        .filter(remaining)
        .min_by_key(|i| candidates[*i].rank)
    else {
        return String::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = candidates[current]
            .dependencies
            .iter()
            .copied()
            .filter(remaining)
            .min_by_key(|i| candidates[*i].rank)
        else {
            break;
        };

        if let Some(pos) = path.iter().position(|p| *p == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|i| candidates[*i].entry.key())
                .collect();
            cycle.push(candidates[next].entry.key());
            return cycle.join(" -> ");
        }
        path.push(next);
        current = next;
    }

    path.iter()
        .map(|i| candidates[*i].entry.key())
        .collect::<Vec<_>>()
        .join(" -> ")
}
