// Copyright (c) 2025 - Cowboy AI, Inc.
//! Build Part Ordering
//!
//! Stable topological order over declared part dependencies: among the parts
//! whose dependencies are already placed, the one supplied first goes next.
//! Parts without dependencies therefore keep the caller's order.

use std::collections::{HashMap, HashSet};

use super::StackBuildPart;
use crate::errors::{StackError, StackResult};

/// Name and dependencies of one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartNode {
    pub name: String,
    pub depends_on: Vec<String>,
}

impl PartNode {
    pub fn new(name: impl Into<String>, depends_on: &[&str]) -> Self {
        Self {
            name: name.into(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn of(part: &dyn StackBuildPart) -> Self {
        Self {
            name: part.name().to_string(),
            depends_on: part.depends_on(),
        }
    }
}

/// Indices of `parts` in build order
pub fn build_order(parts: &[Box<dyn StackBuildPart>]) -> StackResult<Vec<usize>> {
    let nodes: Vec<PartNode> = parts.iter().map(|part| PartNode::of(part.as_ref())).collect();
    order_nodes(&nodes)
}

/// Indices of `nodes` in build order
///
/// Fails on duplicate names, unknown dependencies and cycles, before
/// anything is built.
pub fn order_nodes(nodes: &[PartNode]) -> StackResult<Vec<usize>> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        if index.insert(node.name.as_str(), position).is_some() {
            return Err(StackError::configuration(format!(
                "Build part '{}' is listed twice",
                node.name
            )));
        }
    }

    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        for dependency in &node.depends_on {
            let position = index.get(dependency.as_str()).copied().ok_or_else(|| {
                StackError::UnknownDependency {
                    part: node.name.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            if seen.insert(position) {
                resolved.push(position);
            }
        }
        dependencies.push(resolved);
    }

    let mut placed = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let next = (0..nodes.len())
            .find(|&i| !placed[i] && dependencies[i].iter().all(|&d| placed[d]));

        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                return Err(StackError::DependencyCycle {
                    parts: find_cycle(nodes, &dependencies, &placed),
                })
            }
        }
    }

    Ok(order)
}

/// Walk unplaced dependencies from the first unplaced part until a name repeats
fn find_cycle(nodes: &[PartNode], dependencies: &[Vec<usize>], placed: &[bool]) -> Vec<String> {
    let mut path: Vec<usize> = Vec::new();
    let mut current = placed.iter().position(|p| !p);

    while let Some(i) = current {
        if let Some(start) = path.iter().position(|&p| p == i) {
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&p| nodes[p].name.clone())
                .collect();
            cycle.push(nodes[i].name.clone());
            return cycle;
        }
        path.push(i);
        current = dependencies[i].iter().copied().find(|&d| !placed[d]);
    }

    path.into_iter().map(|p| nodes[p].name.clone()).collect()
}
