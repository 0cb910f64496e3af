//! Dependency graph and initialization-order resolution.
//!
//! [`DependencyGraph::resolve_order`] walks every node depth-first in
//! registration order and emits a node only after all of its dependencies,
//! so the output is a topological order. The walk keeps an explicit stack and
//! a per-node state table instead of recursing, so very deep chains do not
//! grow the native call stack.

use std::collections::HashMap;

use crate::error::{Result, WardenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    InProgress,
    Done,
}

/// "X must be initialized after Y" relations between plugin ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node ids in insertion order.
    order: Vec<String>,
    /// Outgoing edges: id -> ids it depends on, in declared order.
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with its dependencies. Returns `false` (and changes
    /// nothing) if the node already exists.
    pub fn add_node(&mut self, id: &str, dependencies: Vec<String>) -> bool {
        if self.edges.contains_key(id) {
            return false;
        }
        self.order.push(id.to_string());
        self.edges.insert(id.to_string(), dependencies);
        true
    }

    /// Remove a node together with its outgoing edges and every incoming
    /// reference to it. Returns `false` if the node was absent.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.edges.remove(id).is_none() {
            return false;
        }
        self.order.retain(|n| n != id);
        for deps in self.edges.values_mut() {
            deps.retain(|d| d != id);
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.order
    }

    /// Direct dependencies of `id` (empty if unknown).
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes that directly depend on `id`, in insertion order.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| self.dependencies_of(n).iter().any(|d| d == id))
            .cloned()
            .collect()
    }

    /// Compute an order in which every dependency precedes its dependents.
    ///
    /// # Errors
    ///
    /// - [`WardenError::MissingDependency`] if an edge points at an unknown id
    /// - [`WardenError::CircularDependency`] if the graph has a cycle; the
    ///   path runs from the first node of the cycle back to itself
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut state: HashMap<&str, NodeState> = HashMap::with_capacity(self.order.len());
        let mut resolved = Vec::with_capacity(self.order.len());
        // Current DFS path: (node, index of the next dependency to visit).
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in &self.order {
            if state.get(root.as_str()) == Some(&NodeState::Done) {
                continue;
            }
            state.insert(root.as_str(), NodeState::InProgress);
            stack.push((root.as_str(), 0));

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let deps = self.dependencies_of(node);

                if top.1 >= deps.len() {
                    state.insert(node, NodeState::Done);
                    resolved.push(node.to_string());
                    stack.pop();
                    continue;
                }

                let dep = deps[top.1].as_str();
                top.1 += 1;

                match state.get(dep).copied().unwrap_or(NodeState::Unvisited) {
                    NodeState::Done => {}
                    NodeState::InProgress => {
                        let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[start..].iter().map(|(n, _)| n.to_string()).collect();
                        path.push(dep.to_string());
                        return Err(WardenError::CircularDependency { path });
                    }
                    NodeState::Unvisited => {
                        let Some((known, _)) = self.edges.get_key_value(dep) else {
                            return Err(WardenError::MissingDependency {
                                name: dep.to_string(),
                                required_by: node.to_string(),
                            });
                        };
                        state.insert(known.as_str(), NodeState::InProgress);
                        stack.push((known.as_str(), 0));
                    }
                }
            }
        }

        Ok(resolved)
    }
}
