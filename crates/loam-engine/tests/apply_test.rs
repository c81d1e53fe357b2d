//! End-to-end engine tests: parse -> graph -> plan -> apply

use loam_core::parse_stack_str;
use loam_engine::{
    ActionType, ApplyEngine, DependencyGraph, MemoryProvider, Plan, ProviderError,
    ResourceStatus, RetryConfig, StackState,
};
use std::sync::Arc;
use tokio::sync::watch;

const ABC: &str = r#"
stack "abc"

resource "resource-group" "a" {
    location "westeurope"
}

resource "resource-group" "b" {
    location "westeurope"
    depends-on "a"
}

resource "virtual-network" "c" {
    resource-group "${a.name}"
    address-space "10.0.0.0/16"
}
"#;

fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: std::time::Duration::from_millis(1),
        max_delay: std::time::Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

fn setup(kdl: &str) -> (loam_core::Stack, DependencyGraph) {
    let stack = parse_stack_str(kdl, "test".to_string()).unwrap();
    stack.validate().unwrap();
    let graph = DependencyGraph::build(&stack).unwrap();
    (stack, graph)
}

#[tokio::test]
async fn test_waves_then_full_apply() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    assert_eq!(
        plan.waves,
        vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]]
    );

    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());
    let report = engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.count(ResourceStatus::Applied), 3);

    // Wave barrier: a is created strictly before b and c
    let calls = provider.calls();
    assert_eq!(calls[0], "create resource-group/a");
    assert_eq!(calls.len(), 3);

    assert_eq!(state.len(), 3);
    assert!(state.get("c").unwrap().provider_id.starts_with("mem-"));
}

#[tokio::test]
async fn test_deferred_reference_resolves_to_recorded_output() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());
    engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    // c's resource-group held ${a.name}; the provider must have seen
    // a's recorded output, never the placeholder
    let c_outputs = provider.outputs_of("c").unwrap();
    assert_eq!(c_outputs["resource-group"], state.output("a", "name").unwrap());
    assert_eq!(c_outputs["resource-group"], serde_json::json!("a"));
}

#[tokio::test]
async fn test_failed_dependency_skips_dependents() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    let provider = Arc::new(MemoryProvider::new());
    provider.fail_on("a", ProviderError::validation("address space rejected"));

    let engine = ApplyEngine::new(provider.clone());
    let report = engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.count(ResourceStatus::Failed), 1);
    assert_eq!(report.count(ResourceStatus::Skipped), 2);
    assert_eq!(report.outcomes["b"].status, ResourceStatus::Skipped);
    assert_eq!(report.outcomes["c"].status, ResourceStatus::Skipped);

    // Dependents are never attempted
    assert_eq!(provider.calls(), vec!["create resource-group/a"]);
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_identical_resubmission_makes_no_provider_calls() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());

    let plan = Plan::build(&stack, &graph, &state);
    engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();
    let calls_after_first = provider.call_count();

    let second = Plan::build(&stack, &graph, &state);
    assert!(!second.has_changes());

    let report = engine.apply(&stack, &graph, &second, &mut state).await.unwrap();
    assert!(report.is_success());
    assert_eq!(provider.call_count(), calls_after_first);
    assert_eq!(
        report.outcomes["a"].message.as_deref(),
        Some("unchanged")
    );
}

#[tokio::test]
async fn test_transient_errors_retry_until_success() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    let provider = Arc::new(MemoryProvider::new());
    provider.flaky_on("a", 2);

    let engine = ApplyEngine::new(provider.clone()).with_retry(quick_retry());
    let report = engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    assert!(report.is_success());
    let a_attempts = provider
        .calls()
        .iter()
        .filter(|c| c.as_str() == "create resource-group/a")
        .count();
    assert_eq!(a_attempts, 3);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_fails_the_subtree() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    let provider = Arc::new(MemoryProvider::new());
    provider.flaky_on("a", 10);

    let engine = ApplyEngine::new(provider.clone()).with_retry(quick_retry());
    let report = engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    assert_eq!(report.outcomes["a"].status, ResourceStatus::Failed);
    assert_eq!(report.count(ResourceStatus::Skipped), 2);
}

#[tokio::test]
async fn test_update_and_orphan_delete() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());

    let plan = Plan::build(&stack, &graph, &state);
    engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    // Second revision: a's location changes, b is gone
    let revised = r#"
        stack "abc"
        resource "resource-group" "a" {
            location "japaneast"
        }
        resource "virtual-network" "c" {
            resource-group "${a.name}"
            address-space "10.0.0.0/16"
        }
    "#;
    let (stack2, graph2) = setup(revised);
    let plan2 = Plan::build(&stack2, &graph2, &state);
    assert_eq!(plan2.action_for("a").unwrap().action_type, ActionType::Update);
    assert_eq!(plan2.deletes.len(), 1);
    assert_eq!(plan2.deletes[0].resource_id, "b");

    let report = engine.apply(&stack2, &graph2, &plan2, &mut state).await.unwrap();
    assert!(report.is_success());
    assert!(state.get("b").is_none());
    assert!(provider.calls().iter().any(|c| c.starts_with("update resource-group/a")));
    assert!(provider.calls().iter().any(|c| c.starts_with("delete resource-group/")));
}

#[tokio::test]
async fn test_cancellation_prevents_new_applications() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let plan = Plan::build(&stack, &graph, &state);

    let provider = Arc::new(MemoryProvider::new());
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let engine = ApplyEngine::new(provider.clone()).with_cancel(rx);
    let report = engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.count(ResourceStatus::Skipped), 3);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_failed_delete_protects_transitive_dependencies() {
    // a <- b <- c: a failed delete of c must keep b AND a up
    let chain = r#"
        stack "chain"
        resource "resource-group" "a" {
            location "westeurope"
        }
        resource "resource-group" "b" {
            location "westeurope"
            depends-on "a"
        }
        resource "virtual-network" "c" {
            resource-group "${b.name}"
            address-space "10.0.0.0/16"
        }
    "#;
    let (stack, graph) = setup(chain);
    let mut state = StackState::new();
    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());

    let plan = Plan::build(&stack, &graph, &state);
    engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    provider.fail_on("c", ProviderError::other("deletion blocked"));

    let deletes = Plan::destroy_actions(&state);
    assert_eq!(deletes[0].resource_id, "c");

    let report = engine.destroy(&deletes, &mut state).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.outcomes["c"].status, ResourceStatus::Failed);
    assert_eq!(report.outcomes["b"].status, ResourceStatus::Skipped);
    assert_eq!(report.outcomes["a"].status, ResourceStatus::Skipped);

    // Nothing was removed behind the surviving dependents
    assert_eq!(state.len(), 3);
    assert!(provider
        .calls()
        .iter()
        .all(|c| !c.starts_with("delete resource-group")));
}

#[tokio::test]
async fn test_destroy_deletes_everything_dependents_first() {
    let (stack, graph) = setup(ABC);
    let mut state = StackState::new();
    let provider = Arc::new(MemoryProvider::new());
    let engine = ApplyEngine::new(provider.clone());

    let plan = Plan::build(&stack, &graph, &state);
    engine.apply(&stack, &graph, &plan, &mut state).await.unwrap();

    let deletes = Plan::destroy_actions(&state);
    let order: Vec<&str> = deletes.iter().map(|a| a.resource_id.as_str()).collect();
    assert!(order.iter().position(|id| *id == "b").unwrap()
        < order.iter().position(|id| *id == "a").unwrap());
    assert!(order.iter().position(|id| *id == "c").unwrap()
        < order.iter().position(|id| *id == "a").unwrap());

    let report = engine.destroy(&deletes, &mut state).await.unwrap();
    assert!(report.is_success());
    assert!(state.is_empty());
}
