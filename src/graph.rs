//! Document dependency graph

use std::collections::{BTreeMap, BTreeSet};

/// Direct structural dependencies of every document, keyed by canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document` and its direct dependencies. Repeated edges
    /// collapse. An edge from a document to itself is kept; ordering reports
    /// it as a cycle.
    pub fn add_document<I>(&mut self, document: &str, dependencies: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self.edges.entry(document.to_string()).or_default();
        entry.extend(dependencies);
    }

    /// Direct dependencies of `document`; empty for unknown names.
    pub fn dependencies(&self, document: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(document)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn contains(&self, document: &str) -> bool {
        self.edges.contains_key(document)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Edges whose target was never registered as a document.
    pub fn dangling_edges(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(from, deps)| deps.iter().map(move |to| (from.as_str(), to.as_str())))
            .filter(|(_, to)| !self.contains(to))
            .collect()
    }

    /// `document` plus every document reachable from it.
    pub fn closure(&self, document: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut worklist = vec![document.to_string()];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for dep in self.dependencies(&current) {
                if !visited.contains(dep) {
                    worklist.push(dep.to_string());
                }
            }
        }
        visited
    }
}
