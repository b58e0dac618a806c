#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use toolforge::catalog::{ApiDefinition, HttpMethod, Parameter, ParameterLocation};
use toolforge::dsl::WorkflowGraph;
use toolforge::dsl::builder::WorkflowBuilder;

pub fn param(name: &str, location: ParameterLocation, required: bool, schema: Value) -> Parameter {
    Parameter {
        name: name.to_string(),
        location,
        required,
        schema,
    }
}

pub fn api(id: &str, method: HttpMethod, path: &str, parameters: Vec<Parameter>, ok: Value) -> ApiDefinition {
    ApiDefinition {
        id: id.to_string(),
        method,
        path: path.to_string(),
        summary: None,
        parameters,
        responses: BTreeMap::from([("200".to_string(), ok)]),
    }
}

pub fn list_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "id": { "type": "string" } }
                }
            }
        }
    })
}

pub fn detail_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" }
        }
    })
}

pub fn fetch_list() -> ApiDefinition {
    api("fetchList", HttpMethod::Get, "/items", vec![], list_schema())
}

pub fn fetch_detail() -> ApiDefinition {
    api(
        "fetchDetail",
        HttpMethod::Get,
        "/items/{id}",
        vec![param("id", ParameterLocation::Path, true, json!({ "type": "string" }))],
        detail_schema(),
    )
}

pub fn definitions(defs: Vec<ApiDefinition>) -> HashMap<String, ApiDefinition> {
    defs.into_iter().map(|d| (d.id.clone(), d)).collect()
}

/// fetchList -> fetchDetail, mapping `items[0].id -> id`.
pub fn list_then_detail() -> WorkflowGraph {
    WorkflowBuilder::new("list-detail")
        .name("Fetch first item")
        .call("list", "fetchList")
        .call("detail", "fetchDetail")
        .connect_mapped("list", "detail", "items[0].id", "id")
        .build()
}
