// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Build Ordering
//!
//! Any acyclic set of parts is ordered so every part follows what it
//! depends on, and parts without constraints keep their requested order.

use iac_stacks::composition::{order_nodes, PartNode};
use proptest::prelude::*;

/// Acyclic graphs: a part may only depend on parts requested before it
fn acyclic_nodes() -> impl Strategy<Value = Vec<PartNode>> {
    (1usize..12).prop_flat_map(|len| {
        prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), len)
            .prop_map(|picks| {
                picks
                    .into_iter()
                    .enumerate()
                    .map(|(position, picks)| PartNode {
                        name: format!("part-{}", position),
                        depends_on: if position == 0 {
                            Vec::new()
                        } else {
                            picks
                                .iter()
                                .map(|pick| format!("part-{}", pick.index(position)))
                                .collect()
                        },
                    })
                    .collect()
            })
    })
}

proptest! {
    /// Property: every node appears exactly once, after its dependencies
    #[test]
    fn prop_order_respects_dependencies(nodes in acyclic_nodes()) {
        let order = order_nodes(&nodes).expect("acyclic");
        prop_assert_eq!(order.len(), nodes.len());

        let mut position = vec![usize::MAX; nodes.len()];
        for (at, index) in order.iter().enumerate() {
            prop_assert_eq!(position[*index], usize::MAX, "node listed twice");
            position[*index] = at;
        }

        for (index, node) in nodes.iter().enumerate() {
            for dependency in &node.depends_on {
                let dependency_index = nodes
                    .iter()
                    .position(|other| &other.name == dependency)
                    .expect("known dependency");
                prop_assert!(position[dependency_index] < position[index]);
            }
        }
    }

    /// Property: without dependencies the requested order is kept
    #[test]
    fn prop_independent_parts_keep_order(len in 0usize..12) {
        let nodes: Vec<PartNode> = (0..len)
            .map(|i| PartNode::new(format!("part-{}", i), &[]))
            .collect();
        let order = order_nodes(&nodes).expect("acyclic");
        prop_assert_eq!(order, (0..len).collect::<Vec<_>>());
    }
}
