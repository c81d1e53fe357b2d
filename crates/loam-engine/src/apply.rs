//! Wave-by-wave apply engine
//!
//! Resources within a wave run concurrently on tokio tasks; the wave
//! boundary is a hard barrier. Workers return their outcome to the
//! coordinator, which is the only writer of the record set, merging
//! results between waves. Deferred references into a wave's resources
//! resolve from the merged outputs before the next wave starts, so an
//! unresolved interpolation cannot reach a provider call.

use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::plan::{ActionType, Plan};
use crate::provider::{Outputs, Provider, ProviderError, RetryConfig};
use crate::state::{Record, ResourceStatus, StackState};
use loam_core::{Properties, Stack, resolve_properties};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Result of one resource in a run
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: ResourceStatus,
    pub action: ActionType,
    /// Failure reason, skip reason, or "unchanged"
    pub message: Option<String>,
}

impl Outcome {
    fn pending(action: ActionType) -> Self {
        Self {
            status: ResourceStatus::Pending,
            action,
            message: None,
        }
    }
}

/// Per-resource report of a finished run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: BTreeMap<String, Outcome>,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl RunReport {
    /// A run succeeds only when nothing failed and it ran to completion
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.count(ResourceStatus::Failed) == 0
    }

    pub fn count(&self, status: ResourceStatus) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.status == status)
            .count()
    }
}

/// Operation a worker performs against the provider
enum ApplyOp {
    Create,
    Update { provider_id: String },
}

/// Applies plans wave by wave through a provider
pub struct ApplyEngine {
    provider: Arc<dyn Provider>,
    retry: RetryConfig,
    cancel: watch::Receiver<bool>,
}

impl ApplyEngine {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let (_, cancel) = watch::channel(false);
        Self {
            provider,
            retry: RetryConfig::default(),
            cancel,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Install a cancellation signal. Once it turns true no new
    /// resource application starts; in-flight calls finish.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Apply a plan, updating `state` as resources reach terminal states
    pub async fn apply(
        &self,
        stack: &Stack,
        graph: &DependencyGraph,
        plan: &Plan,
        state: &mut StackState,
    ) -> Result<RunReport> {
        let started = std::time::Instant::now();
        let mut report = RunReport::default();

        for (id, action) in &plan.actions {
            report
                .outcomes
                .insert(id.clone(), Outcome::pending(action.action_type));
        }

        // Orphaned records go first, dependents before dependencies
        self.run_deletes(&plan.deletes, state, &mut report).await;

        // Outputs of already-recorded resources are available to
        // references from the start; NoOp resources never re-apply
        let mut outputs: HashMap<String, Outputs> = state
            .records
            .iter()
            .map(|(id, record)| (id.clone(), record.outputs.clone()))
            .collect();

        let mut blocked: BTreeMap<String, String> = BTreeMap::new();

        for wave in &plan.waves {
            if self.is_cancelled() {
                break;
            }

            let mut workers: JoinSet<(String, std::result::Result<Outputs, ProviderError>)> =
                JoinSet::new();

            for id in wave {
                let Some(action) = plan.action_for(id) else {
                    continue;
                };

                if let Some(reason) = blocked.get(id) {
                    self.finish(
                        &mut report,
                        id,
                        ResourceStatus::Skipped,
                        Some(reason.clone()),
                    );
                    continue;
                }
                if self.is_cancelled() {
                    self.finish(
                        &mut report,
                        id,
                        ResourceStatus::Skipped,
                        Some("run cancelled".to_string()),
                    );
                    continue;
                }
                if action.action_type == ActionType::NoOp {
                    self.finish(
                        &mut report,
                        id,
                        ResourceStatus::Applied,
                        Some("unchanged".to_string()),
                    );
                    continue;
                }

                let Some(decl) = stack.get(id) else { continue };

                // Dependencies are all terminal by now, so resolution
                // either succeeds or the declaration is at fault
                let resolved = resolve_properties(id, &decl.properties, |target, field| {
                    outputs.get(target).and_then(|o| o.get(field).cloned())
                });
                let properties = match resolved {
                    Ok(properties) => properties,
                    Err(e) => {
                        self.fail(&mut report, &mut blocked, graph, id, e.to_string());
                        continue;
                    }
                };

                let op = match action.action_type {
                    ActionType::Update => match state.get(id) {
                        Some(record) => ApplyOp::Update {
                            provider_id: record.provider_id.clone(),
                        },
                        None => ApplyOp::Create,
                    },
                    _ => ApplyOp::Create,
                };

                if let Some(outcome) = report.outcomes.get_mut(id) {
                    outcome.status = ResourceStatus::Applying;
                }
                tracing::info!(resource = %id, action = %action.action_type, "Applying");

                let provider = Arc::clone(&self.provider);
                let retry = self.retry.clone();
                let cancel = self.cancel.clone();
                let kind = action.kind.clone();
                let id = id.clone();
                workers.spawn(async move {
                    let result =
                        call_with_retry(provider, retry, cancel, op, &kind, &id, properties).await;
                    (id, result)
                });
            }

            // Wave barrier: merge every worker outcome before the next
            // wave may start
            while let Some(joined) = workers.join_next().await {
                let (id, result) = match joined {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!("apply worker task failed: {e}");
                        continue;
                    }
                };
                match result {
                    Ok(new_outputs) => {
                        self.finish(&mut report, &id, ResourceStatus::Applied, None);
                        self.record(stack, graph, state, &id, new_outputs.clone());
                        outputs.insert(id, new_outputs);
                    }
                    Err(e) => {
                        self.fail(&mut report, &mut blocked, graph, &id, e.to_string());
                    }
                }
            }
        }

        // Anything still pending was never reached (cancellation)
        let cancelled = self.is_cancelled();
        for outcome in report.outcomes.values_mut() {
            if outcome.status == ResourceStatus::Pending {
                outcome.status = ResourceStatus::Skipped;
                outcome.message = Some("run cancelled".to_string());
            }
        }

        report.cancelled = cancelled;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Delete every recorded resource, dependents first
    pub async fn destroy(&self, plan_deletes: &[crate::plan::Action], state: &mut StackState) -> Result<RunReport> {
        let started = std::time::Instant::now();
        let mut report = RunReport::default();
        self.run_deletes(plan_deletes, state, &mut report).await;
        report.cancelled = self.is_cancelled();
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn run_deletes(
        &self,
        deletes: &[crate::plan::Action],
        state: &mut StackState,
        report: &mut RunReport,
    ) {
        // Ids still on the provider side (delete failed or skipped);
        // resources they depend on stay up
        let mut undeleted: BTreeSet<String> = BTreeSet::new();

        for action in deletes {
            let id = &action.resource_id;
            report
                .outcomes
                .insert(id.clone(), Outcome::pending(ActionType::Delete));

            if self.is_cancelled() {
                self.finish(report, id, ResourceStatus::Skipped, Some("run cancelled".to_string()));
                continue;
            }

            let Some(record) = state.get(id).cloned() else {
                continue;
            };

            // Deletes run dependents first, so a surviving dependent is
            // always seen before the resources it depends on
            let still_needed = undeleted.iter().any(|u| {
                state
                    .get(u)
                    .map(|r| r.depends_on.contains(id))
                    .unwrap_or(false)
            });
            if still_needed {
                undeleted.insert(id.clone());
                self.finish(
                    report,
                    id,
                    ResourceStatus::Skipped,
                    Some("a dependent resource could not be deleted".to_string()),
                );
                continue;
            }

            tracing::info!(resource = %id, kind = %record.kind, "Deleting");
            let mut attempt = 1;
            let result = loop {
                match self.provider.delete(&record.kind, &record.provider_id).await {
                    Ok(()) => break Ok(()),
                    Err(e)
                        if e.retryable && attempt < self.retry.max_attempts && !self.is_cancelled() =>
                    {
                        tracing::warn!(resource = %id, attempt, "retrying delete: {e}");
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                        attempt += 1;
                    }
                    Err(e) => break Err(e),
                }
            };

            match result {
                Ok(()) => {
                    state.remove(id);
                    self.finish(report, id, ResourceStatus::Applied, None);
                }
                Err(e) => {
                    undeleted.insert(id.clone());
                    self.finish(report, id, ResourceStatus::Failed, Some(e.to_string()));
                }
            }
        }
    }

    fn finish(
        &self,
        report: &mut RunReport,
        id: &str,
        status: ResourceStatus,
        message: Option<String>,
    ) {
        if let Some(outcome) = report.outcomes.get_mut(id) {
            outcome.status = status;
            outcome.message = message;
        }
    }

    /// Mark a resource failed and block all of its transitive dependents
    fn fail(
        &self,
        report: &mut RunReport,
        blocked: &mut BTreeMap<String, String>,
        graph: &DependencyGraph,
        id: &str,
        message: String,
    ) {
        tracing::error!(resource = %id, "Apply failed: {message}");
        self.finish(report, id, ResourceStatus::Failed, Some(message));
        for dependent in graph.dependents_of(id) {
            blocked
                .entry(dependent)
                .or_insert_with(|| format!("dependency '{id}' failed"));
        }
    }

    /// Merge a successful apply into the record set
    fn record(
        &self,
        stack: &Stack,
        graph: &DependencyGraph,
        state: &mut StackState,
        id: &str,
        outputs: Outputs,
    ) {
        let Some(decl) = stack.get(id) else { return };

        let provider_id = outputs
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| state.get(id).map(|r| r.provider_id.clone()))
            .unwrap_or_default();

        let created_at = state.get(id).map(|r| r.created_at);
        let mut record = Record::new(provider_id, decl.kind.as_str())
            .with_properties(decl.properties.clone())
            .with_outputs(outputs)
            .with_dependencies(
                graph
                    .dependencies_of(id)
                    .map(|deps| deps.iter().cloned().collect())
                    .unwrap_or_default(),
            );
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }
        state.set(id, record);
    }
}

/// Provider call with exponential backoff on retryable errors.
///
/// Cancellation stops further retries but never interrupts a call that
/// is already in flight.
async fn call_with_retry(
    provider: Arc<dyn Provider>,
    retry: RetryConfig,
    cancel: watch::Receiver<bool>,
    op: ApplyOp,
    kind: &str,
    id: &str,
    properties: Properties,
) -> std::result::Result<Outputs, ProviderError> {
    let mut attempt = 1;
    loop {
        let result = match &op {
            ApplyOp::Create => provider.create(kind, id, &properties).await,
            ApplyOp::Update { provider_id } => {
                provider.update(kind, id, provider_id, &properties).await
            }
        };

        match result {
            Ok(outputs) => return Ok(outputs),
            Err(e) if e.retryable && attempt < retry.max_attempts && !*cancel.borrow() => {
                tracing::warn!(resource = %id, attempt, "retrying after transient provider error: {e}");
                tokio::time::sleep(retry.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
