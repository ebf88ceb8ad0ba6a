//! Dependency graph over one node's item set
//!
//! Edges point from a dependency to its dependent and come from three
//! sources: explicit `needs`, auto-deps, and triggers (the triggering
//! item runs first). The graph is built once per apply, after every
//! item has been materialized, and is checked for cycles before any
//! item executes.

use crate::error::{Error, Result};
use crate::item::BoxedItem;
use std::collections::{BTreeSet, HashMap};

/// Index-based graph; index `i` refers to `items[i]` of the build input
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: Vec<String>,
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
    triggered_by: Vec<BTreeSet<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Merge explicit, automatic and trigger edges and reject cycles
    pub fn build(items: &[BoxedItem]) -> Result<Self> {
        let ids: Vec<String> = items.iter().map(|item| item.id()).collect();
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let lookup = |owner: &str, id: &str| {
            index
                .get(id)
                .copied()
                .ok_or_else(|| Error::UnknownDependency {
                    item: owner.to_string(),
                    missing: id.to_string(),
                })
        };

        let n = items.len();
        let mut graph = Self {
            ids: ids.clone(),
            dependencies: vec![BTreeSet::new(); n],
            dependents: vec![BTreeSet::new(); n],
            triggered_by: vec![BTreeSet::new(); n],
        };

        for (i, item) in items.iter().enumerate() {
            for need in item.needs() {
                graph.add_edge(lookup(&ids[i], need)?, i);
            }
            for auto in item.get_auto_deps(items) {
                let dep = lookup(&ids[i], &auto)?;
                log::trace!("{} auto-depends on {}", ids[i], auto);
                graph.add_edge(dep, i);
            }
            for triggered in item.triggers() {
                let target = lookup(&ids[i], triggered)?;
                graph.add_edge(i, target);
                graph.triggered_by[target].insert(i);
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::DependencyCycle(cycle));
        }
        Ok(graph)
    }

    fn add_edge(&mut self, dependency: usize, dependent: usize) {
        self.dependencies[dependent].insert(dependency);
        self.dependents[dependency].insert(dependent);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// Items that must reach a terminal outcome before `index` may run
    pub fn dependencies(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    pub fn dependents(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependents[index]
    }

    /// Items whose fix forces `index` to run
    pub fn triggered_by(&self, index: usize) -> &BTreeSet<usize> {
        &self.triggered_by[index]
    }

    /// Items without dependencies, in input order
    pub fn roots(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.dependencies[i].is_empty())
            .collect()
    }

    /// All transitive dependents of `index`, in ascending index order
    pub fn transitive_dependents(&self, index: usize) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<usize> = self.dependents[index].iter().copied().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents[next].iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    /// Return the ids along one cycle (first id repeated at the end)
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut state = vec![Visit::New; self.len()];
        let mut path = Vec::new();
        (0..self.len()).find_map(|start| {
            (state[start] == Visit::New)
                .then(|| self.visit(start, &mut state, &mut path))
                .flatten()
        })
    }

    fn visit(&self, node: usize, state: &mut [Visit], path: &mut Vec<usize>) -> Option<Vec<String>> {
        state[node] = Visit::InProgress;
        path.push(node);

        for &next in &self.dependents[node] {
            match state[next] {
                Visit::New => {
                    if let Some(cycle) = self.visit(next, state, path) {
                        return Some(cycle);
                    }
                }
                Visit::InProgress => {
                    let start = path.iter().position(|&p| p == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|&i| self.ids[i].clone()).collect();
                    cycle.push(self.ids[next].clone());
                    return Some(cycle);
                }
                Visit::Done => {}
            }
        }

        path.pop();
        state[node] = Visit::Done;
        None
    }
}
