//! Dependency graph for the import plan (§4.4).
//!
//! Computed from `derived.source_entity` edges plus declared `links`.
//! Cycles are fatal with `ConfigError`; otherwise execution is ordered by
//! topological sort so a derived reference never runs before the dataset it
//! depends on.

use std::collections::{HashMap, HashSet};

use niamoto_core::error::{ConfigError, ErrorContext};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
    nodes: HashSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>) {
        self.nodes.insert(name.into());
    }

    /// Records that `dependent` requires `dependency` to run first.
    pub fn add_dependency(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        let dependent = dependent.into();
        let dependency = dependency.into();
        self.nodes.insert(dependent.clone());
        self.nodes.insert(dependency.clone());
        self.edges.entry(dependent).or_default().push(dependency);
    }

    /// Returns nodes ordered so every dependency precedes its dependents.
    /// Unrelated nodes may appear in any relative order (§5: "unrelated
    /// entities may run in any order"), so ties are broken lexicographically
    /// for reproducible logs.
    pub fn topological_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut visited: HashMap<String, VisitState> = HashMap::new();
        let mut order = Vec::new();

        let mut nodes: Vec<&String> = self.nodes.iter().collect();
        nodes.sort();

        for node in nodes {
            self.visit(node, &mut visited, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        node: &str,
        visited: &mut HashMap<String, VisitState>,
        order: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        match visited.get(node) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                return Err(ConfigError {
                    message: format!("cyclic dependency detected involving entity `{node}`"),
                    context: ErrorContext::entity(node),
                });
            }
            None => {}
        }

        visited.insert(node.to_string(), VisitState::InProgress);

        let mut deps: Vec<&String> = self.edges.get(node).into_iter().flatten().collect();
        deps.sort();
        for dep in deps {
            self.visit(dep, visited, order)?;
        }

        visited.insert(node.to_string(), VisitState::Done);
        order.push(node.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}
