//! Property-based tests for build plan construction.
//!
//! Package lists and dependency graphs are generated at random; the plan must
//! respect every dependency edge, contain no duplicates, be deterministic, and
//! always refuse a cyclic graph.

#[cfg(test)]
mod proptest_tests {
    use std::collections::{BTreeMap, BTreeSet};

    use crate::error::Error;
    use crate::node::Node;
    use crate::package_list::{PackageEntry, Restriction};
    use crate::plan::build;
    use proptest::prelude::*;

    fn package(i: usize) -> String {
        format!("pkg{}-1.{}", i, i)
    }

    /// `n` packages with random restrictions and edges that only point to
    /// lower-numbered packages, so the graph is acyclic.
    fn acyclic_input() -> impl Strategy<Value = (Vec<PackageEntry>, BTreeMap<String, Vec<String>>)> {
        (2usize..12).prop_flat_map(|n| {
            (
                prop::collection::vec(prop::option::of(0usize..4), n),
                prop::collection::vec((1usize..n, 0usize..n), 0..(n * 2)),
            )
                .prop_map(move |(restrictions, raw_edges)| {
                    let entries: Vec<PackageEntry> = restrictions
                        .iter()
                        .enumerate()
                        .map(|(i, r)| {
                            let restriction = match r {
                                None => Restriction::Unrestricted,
                                Some(node) => Restriction::Only(BTreeSet::from([Node::ALL[*node]])),
                            };
                            PackageEntry::new(&package(i), restriction, i + 1)
                        })
                        .collect();

                    let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
                    for (from, to) in raw_edges {
                        let to = to % from;
                        deps.entry(package(from)).or_default().push(package(to));
                    }
                    (entries, deps)
                })
        })
    }

    proptest! {
        /// Property: every in-plan dependency precedes its dependent
        #[test]
        fn plan_respects_every_edge((entries, deps) in acyclic_input(), node in 0usize..4) {
            let plan = build(&entries, Node::ALL[node], &[], &deps).unwrap();
            for (index, entry) in plan.entries.iter().enumerate() {
                for dependency in &entry.dependencies {
                    let position = plan.position(dependency).unwrap();
                    prop_assert!(
                        position < index,
                        "{} must come before {}", dependency, entry.key()
                    );
                }
            }
        }

        /// Property: no package appears twice
        #[test]
        fn plan_has_no_duplicates((entries, deps) in acyclic_input(), node in 0usize..4) {
            let plan = build(&entries, Node::ALL[node], &[], &deps).unwrap();
            let keys: BTreeSet<String> = plan.keys().into_iter().collect();
            prop_assert_eq!(keys.len(), plan.len());
        }

        /// Property: building twice yields the same order
        #[test]
        fn plan_is_deterministic((entries, deps) in acyclic_input(), node in 0usize..4) {
            let first = build(&entries, Node::ALL[node], &[], &deps).unwrap();
            let second = build(&entries, Node::ALL[node], &[], &deps).unwrap();
            prop_assert_eq!(first.keys(), second.keys());
        }

        /// Property: every entry allowed on the node is in the plan
        #[test]
        fn plan_contains_selected_entries((entries, deps) in acyclic_input(), node in 0usize..4) {
            let node = Node::ALL[node];
            let plan = build(&entries, node, &[], &deps).unwrap();
            for entry in entries.iter().filter(|e| e.restriction.allows_any(&[node])) {
                prop_assert!(plan.position(&entry.key()).is_some());
            }
        }

        /// Property: closing any dependency path into a loop is refused
        #[test]
        fn cycles_always_error((entries, mut deps) in acyclic_input(), len in 2usize..6) {
            let len = len.min(entries.len());
            // pkg(len-1) -> ... -> pkg0 -> pkg(len-1)
            for i in 1..len {
                deps.entry(package(i)).or_default().push(package(i - 1));
            }
            deps.entry(package(0)).or_default().push(package(len - 1));

            let unrestricted: Vec<PackageEntry> = entries
                .into_iter()
                .map(|e| PackageEntry { restriction: Restriction::Unrestricted, ..e })
                .collect();
            let result = build(&unrestricted, Node::Ibu, &[], &deps);
            let is_cycle = matches!(result, Err(Error::CyclicDependency { .. }));
            prop_assert!(is_cycle, "expected CyclicDependency, got {:?}", result);
        }
    }
}
