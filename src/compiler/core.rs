use crate::catalog::{ApiCatalog, ApiDefinition, CatalogError};
use crate::compiler::enhancer::{self, MetadataEnhancer};
use crate::compiler::error::{CompileError, GraphError};
use crate::compiler::planner::Planner;
use crate::compiler::schema::SchemaInferencer;
use crate::compiler::synthesizer::Synthesizer;
use crate::compiler::validator::Validator;
use crate::dsl::WorkflowGraph;
use crate::runtime::tool::GeneratedTool;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

fn default_lookup_concurrency() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Run the installed metadata enhancer after synthesis.
    #[serde(default)]
    pub enhance: bool,
    /// Upper bound on concurrent catalog lookups.
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            enhance: false,
            lookup_concurrency: default_lookup_concurrency(),
        }
    }
}

pub struct Compiler {
    config: CompilerConfig,
    enhancer: Option<Arc<dyn MetadataEnhancer>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self {
            config,
            enhancer: None,
        }
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn MetadataEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Structural validation only; returns the ordered node ids.
    pub fn check(&self, graph: &WorkflowGraph) -> Result<Vec<String>, GraphError> {
        Validator::new().validate(graph)
    }

    pub async fn compile(&self, graph: &WorkflowGraph, catalog: Arc<dyn ApiCatalog>) -> Result<GeneratedTool, CompileError> {
        // 1. Pass 1: Validate
        let path = Validator::new().validate(graph)?;

        // 2. Pass 2: Fetch definitions
        let definitions = fetch_definitions(graph, catalog, self.config.lookup_concurrency).await?;

        // 3. Pass 3: Plan, infer, synthesize
        let tool = self.build(graph, &path, &definitions)?;

        // 4. Optional: Enhance
        let tool = match (&self.enhancer, self.config.enhance) {
            (Some(e), true) => enhancer::apply(e.as_ref(), tool).await,
            _ => tool,
        };

        info!(graph_id = %graph.id, tool = %tool.name, tool_id = %tool.id, steps = tool.steps.len(), "Tool compiled");
        Ok(tool)
    }

    /// Compiles against an in-hand set of definitions. Never enhances.
    pub fn compile_with_definitions(
        &self,
        graph: &WorkflowGraph,
        definitions: &HashMap<String, ApiDefinition>,
    ) -> Result<GeneratedTool, CompileError> {
        let path = Validator::new().validate(graph)?;
        self.build(graph, &path, definitions)
    }

    fn build(
        &self,
        graph: &WorkflowGraph,
        path: &[String],
        definitions: &HashMap<String, ApiDefinition>,
    ) -> Result<GeneratedTool, CompileError> {
        let plan = Planner::new().plan(path, graph, definitions)?;
        let (input_schema, output_schema) = SchemaInferencer::new().infer(&plan)?;
        Ok(Synthesizer::new().synthesize(&plan, input_schema, output_schema))
    }
}

/// Looks up every distinct api id the graph references, concurrently.
/// Ids the catalog does not know are simply absent from the result.
async fn fetch_definitions(
    graph: &WorkflowGraph,
    catalog: Arc<dyn ApiCatalog>,
    limit: usize,
) -> Result<HashMap<String, ApiDefinition>, CatalogError> {
    let mut ids: Vec<String> = graph.nodes.iter().map(|n| n.api.clone()).collect();
    ids.sort();
    ids.dedup();

    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut lookups = JoinSet::new();
    for id in ids {
        let catalog = catalog.clone();
        let semaphore = semaphore.clone();
        lookups.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let found = catalog.get(&id).await;
            (id, found)
        });
    }

    let mut definitions = HashMap::new();
    while let Some(joined) = lookups.join_next().await {
        let (id, found) = joined.map_err(|e| CatalogError::Lookup(e.to_string()))?;
        match found? {
            Some(def) => {
                definitions.insert(id, def);
            }
            None => debug!(api = %id, "Api not found in catalog"),
        }
    }
    Ok(definitions)
}
