//! Execution planning
//!
//! Turns a validated stack, its dependency graph and the prior records
//! into a deterministic plan: waves of independent resources in apply
//! order, one action per resource, and deletes for records with no
//! surviving declaration.

use crate::graph::DependencyGraph;
use crate::state::StackState;
use loam_core::Stack;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Operation kind planned for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A planned operation on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub kind: String,
    pub resource_id: String,
}

/// Deterministic plan for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Declared resources grouped into waves; each wave's dependencies
    /// all sit in earlier waves, ids within a wave sorted
    pub waves: Vec<Vec<String>>,

    /// Action per declared resource id
    pub actions: BTreeMap<String, Action>,

    /// Recorded resources with no surviving declaration, in delete
    /// order (dependents first)
    pub deletes: Vec<Action>,
}

impl Plan {
    /// Build the plan by diffing declarations against prior records
    pub fn build(stack: &Stack, graph: &DependencyGraph, state: &StackState) -> Self {
        let mut actions = BTreeMap::new();
        for decl in stack.iter() {
            let action_type = match state.get(&decl.id) {
                None => ActionType::Create,
                Some(record) => {
                    if record.kind == decl.kind.as_str() && record.properties == decl.properties {
                        ActionType::NoOp
                    } else {
                        ActionType::Update
                    }
                }
            };
            actions.insert(
                decl.id.clone(),
                Action {
                    action_type,
                    kind: decl.kind.as_str().to_string(),
                    resource_id: decl.id.clone(),
                },
            );
        }

        let orphaned: BTreeSet<String> = state
            .records
            .keys()
            .filter(|id| !stack.contains(id))
            .cloned()
            .collect();
        let deletes = delete_order(state, &orphaned)
            .into_iter()
            .map(|id| {
                let kind = state
                    .get(&id)
                    .map(|r| r.kind.clone())
                    .unwrap_or_default();
                Action {
                    action_type: ActionType::Delete,
                    kind,
                    resource_id: id,
                }
            })
            .collect();

        Self {
            waves: waves(graph),
            actions,
            deletes,
        }
    }

    /// Delete actions for every recorded resource, dependents first.
    /// This is the whole plan of a destroy run.
    pub fn destroy_actions(state: &StackState) -> Vec<Action> {
        let all: BTreeSet<String> = state.records.keys().cloned().collect();
        delete_order(state, &all)
            .into_iter()
            .map(|id| {
                let kind = state
                    .get(&id)
                    .map(|r| r.kind.clone())
                    .unwrap_or_default();
                Action {
                    action_type: ActionType::Delete,
                    kind,
                    resource_id: id,
                }
            })
            .collect()
    }

    pub fn action_for(&self, id: &str) -> Option<&Action> {
        self.actions.get(id)
    }

    pub fn has_changes(&self) -> bool {
        !self.deletes.is_empty()
            || self
                .actions
                .values()
                .any(|a| a.action_type != ActionType::NoOp)
    }

    fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .values()
            .filter(|a| a.action_type == action_type)
            .count()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.count(ActionType::Create),
            update: self.count(ActionType::Update),
            delete: self.deletes.len(),
            no_change: self.count(ActionType::NoOp),
        }
    }
}

/// Counts of planned operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Kahn layering of the dependency graph.
///
/// Wave N holds every node whose dependencies all sit in waves < N;
/// within a wave ids are lexicographic. Running this twice on the same
/// graph yields identical output, which is what makes plans diffable
/// across runs.
pub fn waves(graph: &DependencyGraph) -> Vec<Vec<String>> {
    let mut remaining: BTreeSet<String> = graph.nodes().cloned().collect();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    let mut result = Vec::new();

    while !remaining.is_empty() {
        // BTreeSet iteration gives the lexicographic in-wave order
        let wave: Vec<String> = remaining
            .iter()
            .filter(|id| {
                graph
                    .dependencies_of(id)
                    .map(|deps| deps.iter().all(|d| placed.contains(d)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        // Graph construction rejects cycles, so progress is guaranteed
        debug_assert!(!wave.is_empty());
        if wave.is_empty() {
            break;
        }

        for id in &wave {
            remaining.remove(id);
            placed.insert(id.clone());
        }
        result.push(wave);
    }

    result
}

/// Order for deleting `ids`: every resource before the resources it
/// depends on, using the dependency snapshots in the records
fn delete_order(state: &StackState, ids: &BTreeSet<String>) -> Vec<String> {
    let mut emitted: Vec<String> = Vec::new();
    let mut remaining: BTreeSet<String> = ids.clone();

    while !remaining.is_empty() {
        // Deletable once no remaining record in the set still depends
        // on it
        let ready: Vec<String> = remaining
            .iter()
            .filter(|id| {
                !remaining.iter().any(|other| {
                    other != *id
                        && state
                            .get(other)
                            .map(|r| r.depends_on.iter().any(|d| d == *id))
                            .unwrap_or(false)
                })
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            // Dependency snapshot has a cycle (should not happen); fall
            // back to plain order rather than spin
            emitted.extend(remaining.iter().cloned());
            break;
        }

        for id in &ready {
            remaining.remove(id);
        }
        emitted.extend(ready);
    }

    emitted
}
