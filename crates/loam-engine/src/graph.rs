//! Dependency graph construction and cycle detection
//!
//! An edge A -> B means "B must be applied before A". Edges come from
//! explicit `depends-on` ids and from every deferred reference embedded
//! in A's properties. The graph is rejected up front if it contains a
//! cycle.

use crate::error::{EngineError, Result};
use loam_core::{Stack, scan_references};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable dependency graph over resource ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node -> ids it depends on
    dependencies: BTreeMap<String, BTreeSet<String>>,
    /// node -> ids depending on it
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build the graph for a validated stack.
    ///
    /// Every declaration becomes a node even when isolated; duplicate
    /// edges collapse. Fails with `CyclicDependency` naming the cycle
    /// members when the declarations are not acyclic.
    pub fn build(stack: &Stack) -> Result<Self> {
        let mut graph = Self::default();

        for decl in stack.iter() {
            graph.dependencies.entry(decl.id.clone()).or_default();
            graph.dependents.entry(decl.id.clone()).or_default();

            let mut deps: BTreeSet<String> = decl.depends_on.iter().cloned().collect();
            for reference in scan_references(&decl.id, &decl.properties)? {
                deps.insert(reference.target);
            }

            for dep in deps {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(decl.id.clone());
                graph
                    .dependencies
                    .get_mut(&decl.id)
                    .unwrap()
                    .insert(dep);
            }
        }

        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Node ids in lexicographic order
    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.dependencies.keys()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(id)
    }

    /// Transitive dependents of a node (everything that must be skipped
    /// when `id` fails), excluding `id` itself
    pub fn dependents_of(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.dependents.get(current) {
                for child in children {
                    if seen.insert(child.clone()) {
                        stack.push(child);
                    }
                }
            }
        }
        seen
    }

    /// DFS three-color cycle detection, reporting the back-edge path
    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        let mut marks: BTreeMap<&str, Mark> =
            self.dependencies.keys().map(|k| (k.as_str(), Mark::White)).collect();

        fn visit<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            marks.insert(node, Mark::Grey);
            path.push(node);

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match marks.get(dep.as_str()).copied() {
                        Some(Mark::White) => visit(dep, graph, marks, path)?,
                        Some(Mark::Grey) => {
                            // Back edge: the cycle is the path suffix
                            // starting at the revisited node
                            let start = path
                                .iter()
                                .position(|n| *n == dep.as_str())
                                .unwrap_or(0);
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|n| (*n).to_string()).collect();
                            cycle.push(dep.clone());
                            return Err(EngineError::CyclicDependency(cycle));
                        }
                        // Black or a dep with no node entry (caught by
                        // stack validation)
                        _ => {}
                    }
                }
            }

            path.pop();
            marks.insert(node, Mark::Black);
            Ok(())
        }

        let ids: Vec<&str> = self.dependencies.keys().map(String::as_str).collect();
        let mut path = Vec::new();
        for id in ids {
            if marks.get(id).copied() == Some(Mark::White) {
                visit(id, self, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }
}
