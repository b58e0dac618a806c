use anyhow::{Result, Context as AnyhowContext};
use serde::de::DeserializeOwned;
use std::fs;
use crate::api::CompileRequest;
use crate::catalog::{ApiDefinition, InMemoryCatalog};
use crate::dsl::WorkflowGraph;
use crate::runtime::http::RouteTable;
use crate::runtime::tool::GeneratedTool;
use crate::verifier::{TestCase, VerifierConfig};

fn read_yaml<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path))?;

    serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path))
}

fn read_json<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let json_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read JSON file from {}", file_path))?;

    serde_json::from_str(&json_content)
        .with_context(|| format!("Failed to deserialize JSON content from {}", file_path))
}

pub fn load_workflow_from_yaml(file_path: &str) -> Result<WorkflowGraph> {
    read_yaml(file_path)
}

/// A catalog file is a YAML list of API definitions.
pub fn load_catalog_from_yaml(file_path: &str) -> Result<InMemoryCatalog> {
    let definitions: Vec<ApiDefinition> = read_yaml(file_path)?;
    Ok(InMemoryCatalog::from_definitions(definitions))
}

pub fn load_tool_from_json(file_path: &str) -> Result<GeneratedTool> {
    read_json(file_path)
}

pub fn load_compile_request(file_path: &str) -> Result<CompileRequest> {
    read_json(file_path)
}

/// A test suite is a YAML list of `{ input, expected? }` entries.
pub fn load_test_cases_from_yaml(file_path: &str) -> Result<Vec<TestCase>> {
    read_yaml(file_path)
}

pub fn load_verifier_config(file_path: &str) -> Result<VerifierConfig> {
    read_yaml(file_path)
}

pub fn load_route_table(file_path: &str) -> Result<RouteTable> {
    read_yaml(file_path)
}
