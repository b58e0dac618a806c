//! Request/response shapes exchanged with the editor and other callers.

use crate::catalog::{ApiDefinition, InMemoryCatalog};
use crate::compiler::core::Compiler;
use crate::compiler::error::CompileError;
use crate::dsl::WorkflowGraph;
use crate::runtime::tool::GeneratedTool;
use crate::verifier::{TestCase, VerificationResult, Verifier};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub graph: WorkflowGraph,
    #[serde(default)]
    pub api_definitions: HashMap<String, ApiDefinition>,
}

impl CompileRequest {
    /// Catalog over the request's definitions; map keys win over embedded ids.
    pub fn catalog(&self) -> InMemoryCatalog {
        InMemoryCatalog::from_definitions(self.api_definitions.iter().map(|(id, def)| ApiDefinition {
            id: id.clone(),
            ..def.clone()
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl From<&CompileError> for ErrorPayload {
    fn from(err: &CompileError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            node_id: err.node_id().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompileResponse {
    Tool { tool: GeneratedTool },
    Error { error: ErrorPayload },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub tool: GeneratedTool,
    pub test_inputs: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub results: Vec<VerificationResult>,
}

pub async fn handle_compile(compiler: &Compiler, request: CompileRequest) -> CompileResponse {
    let catalog = Arc::new(request.catalog());
    match compiler.compile(&request.graph, catalog).await {
        Ok(tool) => CompileResponse::Tool { tool },
        Err(e) => {
            warn!(graph_id = %request.graph.id, kind = e.kind(), error = %e, "Compilation failed");
            CompileResponse::Error { error: ErrorPayload::from(&e) }
        }
    }
}

pub async fn handle_verify(verifier: &Verifier, request: VerifyRequest) -> VerifyResponse {
    VerifyResponse {
        results: verifier.verify(&request.tool, &request.test_inputs).await,
    }
}
