//! Component dependency graph and startup planning.
//!
//! Components are nodes of a directed acyclic graph. An edge `A → B` means
//! "B depends on A": A must report started before B may start.
//!
//! Cycles are rejected when the offending edge is inserted. Ordering uses
//! Kahn's algorithm with a sorted frontier so plans are deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{GraphError, GraphResult};

/// Directed dependency graph over component names.
#[derive(Debug, Clone, Default)]
pub struct ComponentGraph {
    /// `dependency → {dependent, ...}`
    downstream: BTreeMap<String, BTreeSet<String>>,
    /// `dependent → {dependency, ...}`
    upstream: BTreeMap<String, BTreeSet<String>>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.downstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.downstream.contains_key(name)
    }

    /// Register a component. Names are unique.
    pub fn add_node(&mut self, name: &str) -> GraphResult<()> {
        if self.contains(name) {
            return Err(GraphError::DuplicateComponent {
                name: name.to_string(),
            });
        }
        self.downstream.insert(name.to_string(), BTreeSet::new());
        self.upstream.insert(name.to_string(), BTreeSet::new());
        Ok(())
    }

    /// Remove a component and every edge touching it.
    pub fn remove_node(&mut self, name: &str) {
        self.downstream.remove(name);
        self.upstream.remove(name);
        for set in self.downstream.values_mut().chain(self.upstream.values_mut()) {
            set.remove(name);
        }
    }

    /// Add an edge: `dependent` depends on `dependency`.
    ///
    /// Both must be registered. The edge is rolled back and
    /// [`GraphError::Cycle`] returned if it would close a cycle.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> GraphResult<()> {
        for name in [dependency, dependent] {
            if !self.contains(name) {
                return Err(GraphError::UnknownComponent {
                    name: name.to_string(),
                });
            }
        }

        self.downstream
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.upstream
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());

        if let Some(cycle) = self.find_cycle_through(dependent) {
            if let Some(set) = self.downstream.get_mut(dependency) {
                set.remove(dependent);
            }
            if let Some(set) = self.upstream.get_mut(dependent) {
                set.remove(dependency);
            }
            return Err(GraphError::Cycle { components: cycle });
        }
        Ok(())
    }

    /// Direct dependencies of `name`, sorted.
    pub fn dependencies_of(&self, name: &str) -> GraphResult<Vec<String>> {
        self.upstream
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .ok_or_else(|| GraphError::UnknownComponent {
                name: name.to_string(),
            })
    }

    /// Direct dependents of `name`, sorted.
    pub fn dependents_of(&self, name: &str) -> GraphResult<Vec<String>> {
        self.downstream
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .ok_or_else(|| GraphError::UnknownComponent {
                name: name.to_string(),
            })
    }

    /// All components in start order (dependencies first).
    pub fn topological_order(&self) -> GraphResult<Vec<String>> {
        Ok(self.start_waves()?.into_iter().flatten().collect())
    }

    /// Components grouped by Kahn wave. Members of one wave have no
    /// dependencies on each other and may start concurrently.
    pub fn start_waves(&self) -> GraphResult<Vec<Vec<String>>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .upstream
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut frontier: VecDeque<(&str, usize)> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| (name, 0))
            .collect();

        let mut waves: Vec<Vec<String>> = Vec::new();
        let mut placed = 0;

        while let Some((name, wave)) = frontier.pop_front() {
            if waves.len() <= wave {
                waves.push(Vec::new());
            }
            waves[wave].push(name.to_string());
            placed += 1;

            let mut next: Vec<&str> = Vec::new();
            for dependent in self.downstream.get(name).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(dependent.as_str());
                    }
                }
            }
            next.sort_unstable();
            frontier.extend(next.into_iter().map(|n| (n, wave + 1)));
        }

        if placed != self.len() {
            return Err(GraphError::Cycle {
                components: in_degree
                    .into_iter()
                    .filter(|(_, deg)| *deg > 0)
                    .map(|(name, _)| name.to_string())
                    .collect(),
            });
        }
        for wave in &mut waves {
            wave.sort_unstable();
        }
        Ok(waves)
    }

    /// DFS from `start` along dependent edges. Returns the cycle path if
    /// `start` is reachable from itself.
    fn find_cycle_through(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut path = vec![start.to_string()];
        if self.dfs_cycle(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs_cycle(
        &self,
        start: &str,
        node: &str,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        for next in self.downstream.get(node).into_iter().flatten() {
            if next == start {
                path.push(next.clone());
                return true;
            }
            if !visited.insert(next.clone()) {
                continue;
            }
            path.push(next.clone());
            if self.dfs_cycle(start, next, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ComponentGraph {
        // bootnode → beacon-node → validator-client
        let mut g = ComponentGraph::new();
        for name in ["validator-client", "beacon-node", "bootnode"] {
            g.add_node(name).unwrap();
        }
        g.add_dependency("bootnode", "beacon-node").unwrap();
        g.add_dependency("beacon-node", "validator-client").unwrap();
        g
    }

    #[test]
    fn test_topological_order_respects_deps() {
        let order = chain().topological_order().unwrap();
        assert_eq!(order, vec!["bootnode", "beacon-node", "validator-client"]);
    }

    #[test]
    fn test_mutual_dependency_rejected_and_rolled_back() {
        let mut g = ComponentGraph::new();
        g.add_node("x").unwrap();
        g.add_node("y").unwrap();
        g.add_dependency("x", "y").unwrap();
        let err = g.add_dependency("y", "x").unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
        // Graph is still usable after the rejected edge.
        assert_eq!(g.topological_order().unwrap(), vec!["x", "y"]);
        assert!(g.dependencies_of("x").unwrap().is_empty());
    }

    #[test]
    fn test_longer_cycle_reports_path() {
        let mut g = chain();
        let err = g
            .add_dependency("validator-client", "bootnode")
            .unwrap_err();
        match err {
            GraphError::Cycle { components } => {
                assert_eq!(components.first(), components.last());
                assert!(components.contains(&"beacon-node".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_and_unknown_components() {
        let mut g = ComponentGraph::new();
        g.add_node("bootnode").unwrap();
        assert!(matches!(
            g.add_node("bootnode"),
            Err(GraphError::DuplicateComponent { .. })
        ));
        assert!(matches!(
            g.add_dependency("bootnode", "missing"),
            Err(GraphError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn test_diamond_start_waves() {
        let mut g = ComponentGraph::new();
        for name in ["execution-node", "bootnode", "beacon-node", "validator-client"] {
            g.add_node(name).unwrap();
        }
        g.add_dependency("execution-node", "beacon-node").unwrap();
        g.add_dependency("bootnode", "beacon-node").unwrap();
        g.add_dependency("beacon-node", "validator-client").unwrap();

        let waves = g.start_waves().unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["bootnode", "execution-node"]);
        assert_eq!(waves[1], vec!["beacon-node"]);
        assert_eq!(g.dependents_of("bootnode").unwrap(), vec!["beacon-node"]);
    }
}
