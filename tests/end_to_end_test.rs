mod common;

use common::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use toolforge::api::{self, CompileRequest, CompileResponse, VerifyRequest};
use toolforge::catalog::HttpMethod;
use toolforge::compiler::core::Compiler;
use toolforge::dsl::builder::WorkflowBuilder;
use toolforge::runtime::http::{HttpCaller, RouteTable};
use toolforge::verifier::{TestCase, VerificationStatus, Verifier, VerifierConfig};

#[tokio::test]
async fn test_compile_then_verify_list_detail() {
    // 1. Compile through the boundary payload
    let request = CompileRequest {
        graph: list_then_detail(),
        api_definitions: HashMap::from([
            ("fetchList".to_string(), fetch_list()),
            ("fetchDetail".to_string(), fetch_detail()),
        ]),
    };
    let tool = match api::handle_compile(&Compiler::new(), request).await {
        CompileResponse::Tool { tool } => tool,
        CompileResponse::Error { error } => panic!("Compilation failed: {:?}", error),
    };

    assert_eq!(tool.input_schema, json!({ "type": "object", "properties": {} }));
    assert_eq!(tool.output_schema, detail_schema());

    // 2. Verify against canned responses
    let routes = RouteTable::new()
        .route(HttpMethod::Get, "/items", 200, json!({ "items": [ { "id": "42" } ] }))
        .route(HttpMethod::Get, "/items/42", 200, json!({ "id": "42", "name": "X" }));
    let verifier = Verifier::new(
        VerifierConfig::default(),
        Arc::new(move || Arc::new(routes.fresh()) as Arc<dyn HttpCaller>),
    );
    let response = api::handle_verify(
        &verifier,
        VerifyRequest {
            tool,
            test_inputs: vec![TestCase::new(json!({}))],
        },
    )
    .await;

    // 3. Assert
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].status, VerificationStatus::Passed);
    assert_eq!(response.results[0].output, Some(json!({ "id": "42", "name": "X" })));
    assert_eq!(verifier.live_contexts(), 0);
}

#[tokio::test]
async fn test_compile_error_payload() {
    let request = CompileRequest {
        graph: WorkflowBuilder::new("pair").call("a", "fetchList").call("b", "fetchList").build(),
        api_definitions: HashMap::from([("fetchList".to_string(), fetch_list())]),
    };

    let response = api::handle_compile(&Compiler::new(), request).await;
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["error"]["kind"], "MultipleStartNodes");
    assert_eq!(value["error"]["nodeId"], "a");
    assert!(value["error"]["message"].as_str().unwrap().contains("a, b"));
    assert!(value.get("tool").is_none());
}

#[test]
fn test_compile_request_wire_format() {
    let raw = json!({
        "graph": {
            "id": "g",
            "name": "Detail",
            "nodes": [ { "id": "d", "api": "detail" } ]
        },
        "apiDefinitions": {
            "detail": {
                "id": "ignored",
                "method": "get",
                "path": "/items/{id}",
                "parameters": [ { "name": "id", "in": "path", "schema": { "type": "string" } } ],
                "responses": { "200": { "type": "object" } }
            }
        }
    });

    let request: CompileRequest = serde_json::from_value(raw).expect("Request should parse");
    let tool = Compiler::new()
        .compile_with_definitions(&request.graph, &request.api_definitions)
        .expect("Compilation failed");

    // path parameters are required even when the definition omits it
    assert_eq!(tool.input_schema["required"], json!(["id"]));
    assert_eq!(tool.steps[0].method, HttpMethod::Get);
}

#[test]
fn test_verify_response_wire_format() {
    let raw = json!({
        "tool": serde_json::to_value(
            Compiler::new()
                .compile_with_definitions(&list_then_detail(), &definitions(vec![fetch_list(), fetch_detail()]))
                .unwrap()
        ).unwrap(),
        "testInputs": [
            { "input": {} },
            { "input": {}, "expected": { "subset": { "name": "X" } } },
            { "input": {}, "expected": { "step_failure": { "step_index": 1, "status_code": 404 } } }
        ]
    });

    let request: VerifyRequest = serde_json::from_value(raw).expect("Request should parse");
    assert_eq!(request.test_inputs.len(), 3);
    assert!(request.test_inputs[0].expected.is_none());
}
