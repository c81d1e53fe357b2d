//! Loam engine: dependency graph, execution planner and apply engine
//!
//! The evaluation pipeline over a parsed stack:
//!
//! 1. `DependencyGraph::build` derives a DAG from explicit `depends-on`
//!    ids and every deferred reference in properties, rejecting cycles.
//! 2. `Plan::build` diffs declarations against prior records and layers
//!    the DAG into deterministic waves of independent resources.
//! 3. `ApplyEngine::apply` executes the plan wave by wave through a
//!    `Provider`, retrying transient failures, skipping the dependents
//!    of failed resources, and persisting records via `StateManager`.
//!
//! All of it is driven through explicit values passed between stages;
//! there is no process-wide registry.

pub mod apply;
pub mod error;
pub mod graph;
pub mod plan;
pub mod provider;
pub mod state;

pub use apply::{ApplyEngine, Outcome, RunReport};
pub use error::{EngineError, Result};
pub use graph::DependencyGraph;
pub use plan::{Action, ActionType, Plan, PlanSummary, waves};
pub use provider::{
    MemoryProvider, Outputs, Provider, ProviderError, ProviderErrorKind, RetryConfig,
};
pub use state::{Record, ResourceStatus, StackState, StateLock, StateManager};
