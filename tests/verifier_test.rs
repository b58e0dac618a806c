mod common;

use async_trait::async_trait;
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use toolforge::catalog::HttpMethod;
use toolforge::compiler::core::Compiler;
use toolforge::runtime::http::{HttpCaller, HttpRequest, HttpResponse, RouteTable};
use toolforge::runtime::tool::GeneratedTool;
use toolforge::verifier::expectation::Expectation;
use toolforge::verifier::sandbox::{ContextState, IsolatedContext};
use toolforge::verifier::{CallerFactory, RunFailure, TestCase, VerificationStatus, Verifier, VerifierConfig};

fn list_detail_tool() -> GeneratedTool {
    Compiler::new()
        .compile_with_definitions(&list_then_detail(), &definitions(vec![fetch_list(), fetch_detail()]))
        .expect("Compilation failed")
}

fn healthy_routes() -> RouteTable {
    RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .route(HttpMethod::Get, "/items/42", 200, json!({ "id": "42", "name": "X" }))
}

fn serve(routes: RouteTable) -> CallerFactory {
    Arc::new(move || Arc::new(routes.fresh()) as Arc<dyn HttpCaller>)
}

fn config(timeout_ms: u64) -> VerifierConfig {
    VerifierConfig { timeout_ms, max_parallel: 4 }
}

#[derive(Debug)]
struct PanickingCaller;

#[async_trait]
impl HttpCaller for PanickingCaller {
    async fn call(&self, _request: HttpRequest) -> anyhow::Result<HttpResponse> {
        panic!("connection pool poisoned");
    }
}

#[tokio::test]
async fn test_passing_case() {
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));

    let results = verifier.verify(&list_detail_tool(), &[TestCase::new(json!({}))]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, VerificationStatus::Passed);
    assert_eq!(results[0].output, Some(json!({ "id": "42", "name": "X" })));
    assert_eq!(results[0].error, None);
    assert_eq!(verifier.live_contexts(), 0);
}

#[tokio::test]
async fn test_timeout_tears_the_context_down() {
    let routes = RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .delayed(Duration::from_secs(5));
    let verifier = Verifier::new(config(50), serve(routes));

    let results = verifier.verify(&list_detail_tool(), &[TestCase::new(json!({}))]).await;

    assert_eq!(results[0].status, VerificationStatus::TimedOut);
    assert_eq!(results[0].error, Some(RunFailure::TimedOut { timeout_ms: 50 }));
    assert!(results[0].elapsed_ms < 5_000);
    assert_eq!(verifier.live_contexts(), 0);
}

#[tokio::test]
async fn test_panicking_tool_is_a_crash() {
    let verifier = Verifier::new(config(5_000), Arc::new(|| Arc::new(PanickingCaller) as Arc<dyn HttpCaller>));

    let results = verifier.verify(&list_detail_tool(), &[TestCase::new(json!({}))]).await;

    assert_eq!(results[0].status, VerificationStatus::CrashFailed);
    match &results[0].error {
        Some(RunFailure::Crashed { message }) => assert!(message.contains("connection pool poisoned")),
        other => panic!("Expected Crashed, got {:?}", other),
    }
    assert_eq!(verifier.live_contexts(), 0);
}

#[tokio::test]
async fn test_final_step_failure_is_reported_for_every_input() {
    let routes = RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .route(HttpMethod::Get, "/items/42", 500, json!({ "error": "boom" }));
    let verifier = Verifier::new(config(5_000), serve(routes));
    let cases = vec![TestCase::new(json!({})), TestCase::new(json!({ "unused": true }))];

    let results = verifier.verify(&list_detail_tool(), &cases).await;

    for result in &results {
        assert_eq!(result.status, VerificationStatus::Failed);
        assert_eq!(result.error, Some(RunFailure::StepFailed { step_index: 1, status_code: 500 }));
    }
}

#[tokio::test]
async fn test_expected_step_failure_passes() {
    let routes = RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .route(HttpMethod::Get, "/items/42", 404, json!({}));
    let verifier = Verifier::new(config(5_000), serve(routes));
    let case = TestCase::new(json!({})).expecting(Expectation::StepFailure { step_index: 1, status_code: 404 });

    let results = verifier.verify(&list_detail_tool(), &[case]).await;
    assert_eq!(results[0].status, VerificationStatus::Passed);
}

#[tokio::test]
async fn test_expectation_mismatch_is_a_failure() {
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));
    let cases = vec![
        TestCase::new(json!({})).expecting(Expectation::Equals(json!({ "id": "42", "name": "X" }))),
        TestCase::new(json!({})).expecting(Expectation::Subset(json!({ "name": "Y" }))),
        TestCase::new(json!({})).expecting(Expectation::Predicate("name == \"X\" && id == \"42\"".to_string())),
    ];

    let results = verifier.verify(&list_detail_tool(), &cases).await;

    assert_eq!(results[0].status, VerificationStatus::Passed);
    assert_eq!(results[1].status, VerificationStatus::Failed);
    assert!(matches!(results[1].error, Some(RunFailure::Mismatch { .. })));
    assert_eq!(results[2].status, VerificationStatus::Passed);
}

#[tokio::test]
async fn test_invalid_input_is_a_crash() {
    let tool = Compiler::new()
        .compile_with_definitions(
            &toolforge::dsl::builder::WorkflowBuilder::new("detail").call("d", "fetchDetail").build(),
            &definitions(vec![fetch_detail()]),
        )
        .unwrap();
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));

    let results = verifier.verify(&tool, &[TestCase::new(json!({ "id": 7 }))]).await;
    assert_eq!(results[0].status, VerificationStatus::CrashFailed);
}

#[tokio::test]
async fn test_every_context_gets_its_own_caller() {
    let made = Arc::new(AtomicUsize::new(0));
    let routes = healthy_routes();
    let counter = made.clone();
    let factory: CallerFactory = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(routes.fresh()) as Arc<dyn HttpCaller>
    });
    let verifier = Verifier::new(VerifierConfig { timeout_ms: 5_000, max_parallel: 2 }, factory);
    let cases: Vec<TestCase> = (0..5).map(|_| TestCase::new(json!({}))).collect();

    let results = verifier.verify(&list_detail_tool(), &cases).await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.status == VerificationStatus::Passed));
    assert_eq!(made.load(Ordering::SeqCst), 5);
    assert_eq!(verifier.live_contexts(), 0);
}

#[tokio::test]
async fn test_results_keep_input_order() {
    let routes = RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .route(HttpMethod::Get, "/items/42", 200, json!({ "id": "42", "name": "X" }))
        .delayed(Duration::from_millis(20));
    let verifier = Verifier::new(config(5_000), serve(routes));
    let cases = vec![
        TestCase::new(json!({})).expecting(Expectation::Subset(json!({ "name": "nope" }))),
        TestCase::new(json!({})),
    ];

    let results = verifier.verify(&list_detail_tool(), &cases).await;
    assert_eq!(results[0].status, VerificationStatus::Failed);
    assert_eq!(results[1].status, VerificationStatus::Passed);
}

#[tokio::test]
async fn test_context_directory_is_removed_on_drop() {
    let live = Arc::new(AtomicUsize::new(0));
    let ctx = IsolatedContext::provision(b"{}", live.clone()).expect("Provisioning failed");
    let dir = ctx.path().to_path_buf();

    assert!(dir.join("tool.json").exists());
    assert_eq!(ctx.state(), ContextState::Provisioning);
    assert_eq!(live.load(Ordering::SeqCst), 1);

    drop(ctx);

    assert!(!dir.exists());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreadable_artifact_crashes_without_leaking() {
    let live = Arc::new(AtomicUsize::new(0));
    let mut ctx = IsolatedContext::provision(b"not a tool", live.clone()).unwrap();

    let outcome = ctx
        .run(json!({}), Arc::new(RouteTable::new()), Duration::from_secs(1))
        .await;
    assert!(matches!(outcome, toolforge::verifier::sandbox::RunOutcome::Crashed(_)));

    ctx.teardown().await;
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_completed_run_tears_down_cleanly() {
    let live = Arc::new(AtomicUsize::new(0));
    let artifact = serde_json::to_vec(&list_detail_tool()).unwrap();
    let mut ctx = IsolatedContext::provision(&artifact, live.clone()).unwrap();
    let dir = ctx.path().to_path_buf();

    let outcome = ctx
        .run(json!({}), Arc::new(healthy_routes()), Duration::from_secs(5))
        .await;
    assert_eq!(
        outcome,
        toolforge::verifier::sandbox::RunOutcome::Completed(json!({ "id": "42", "name": "X" }))
    );

    // 完成后再拆除不能 panic
    ctx.teardown().await;
    assert!(!dir.exists());
    assert_eq!(live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predicate_reads_array_elements() {
    let tool = Compiler::new()
        .compile_with_definitions(
            &toolforge::dsl::builder::WorkflowBuilder::new("list").call("l", "fetchList").build(),
            &definitions(vec![fetch_list()]),
        )
        .unwrap();
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));
    let cases = vec![
        TestCase::new(json!({})).expecting(Expectation::Predicate("items.0.id == \"42\"".to_string())),
        TestCase::new(json!({})).expecting(Expectation::Predicate("items.0.id == \"7\"".to_string())),
    ];

    let results = verifier.verify(&tool, &cases).await;

    assert_eq!(results[0].status, VerificationStatus::Passed);
    assert_eq!(results[1].status, VerificationStatus::Failed);
}

#[test]
fn test_predicate_over_nested_and_dashed_keys() {
    let output = json!({
        "user": { "id": 7, "first-name": "Ada" },
        "items": [ { "id": "a" }, { "id": "b", "in-stock": true } ]
    });

    let holds = |expr: &str| Expectation::Predicate(expr.to_string()).check_output(&output);

    assert_eq!(holds("user.id == 7 && user.first_name == \"Ada\""), Ok(()));
    assert_eq!(holds("items.1.id == \"b\" && items.1.in_stock"), Ok(()));
    assert!(holds("items.0.id == \"b\"").is_err());

    let err = holds("nobody.here == 1").unwrap_err();
    assert!(err.contains("could not be evaluated"), "{}", err);
}

#[test]
fn test_scalar_output_is_bound_as_output() {
    let check = Expectation::Predicate("output > 2".to_string()).check_output(&json!(3));
    assert_eq!(check, Ok(()));
}

#[tokio::test]
async fn test_case_without_input_runs_with_empty_object() {
    let case: TestCase = serde_json::from_value(json!({})).unwrap();
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));

    let results = verifier.verify(&list_detail_tool(), &[case]).await;
    assert_eq!(results[0].status, VerificationStatus::Passed);
}

#[tokio::test]
async fn test_mapping_past_the_end_only_fails_its_own_case() {
    let batch = api(
        "batch",
        HttpMethod::Post,
        "/batch",
        vec![param(
            "ids",
            toolforge::catalog::ParameterLocation::Body,
            true,
            json!({ "type": "array", "items": { "type": "string" } }),
        )],
        json!({ "type": "object" }),
    );
    let graph = toolforge::dsl::builder::WorkflowBuilder::new("batch")
        .call("list", "fetchList")
        .call("batch", "batch")
        .connect_mapped("list", "batch", "items[0].id", "ids[3]")
        .build();
    let tool = Compiler::new()
        .compile_with_definitions(&graph, &definitions(vec![fetch_list(), batch]))
        .expect("Compilation failed");
    let verifier = Verifier::new(config(5_000), serve(healthy_routes()));

    let results = verifier.verify(&tool, &[TestCase::new(json!({})), TestCase::new(json!({}))]).await;

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.status, VerificationStatus::CrashFailed);
        match &result.error {
            Some(RunFailure::Crashed { message }) => assert!(message.contains("ids[3]"), "{}", message),
            other => panic!("Expected Crashed, got {:?}", other),
        }
    }
    assert_eq!(verifier.live_contexts(), 0);
}
