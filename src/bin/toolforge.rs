use clap::{Parser, Subcommand};
use toolforge::api::{self, CompileResponse, VerifyRequest};
use toolforge::catalog::ApiCatalog;
use toolforge::catalog::redis_catalog::RedisCatalog;
use toolforge::compiler::core::Compiler;
use toolforge::compiler::loader;
use toolforge::runtime::http::{HttpCaller, ReqwestCaller};
use toolforge::verifier::{CallerFactory, VerificationStatus, Verifier, VerifierConfig};
use std::sync::Arc;
use std::path::{Path, PathBuf};
use anyhow::{Result, Context as AnyhowContext, bail};
use tracing::{info, error};
use tracing_subscriber::EnvFilter;
use std::fs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow graph and print its call order
    Check {
        /// Path to the workflow YAML file
        #[arg(long, short)]
        graph: PathBuf,
    },

    /// Compile a workflow graph into a tool
    Compile {
        /// Path to the workflow YAML file
        #[arg(long, short, required_unless_present = "request")]
        graph: Option<PathBuf>,

        /// YAML list of API definitions
        #[arg(long, short, conflicts_with = "redis")]
        catalog: Option<PathBuf>,

        /// Read API definitions from a Redis hash instead of a file
        #[arg(long)]
        redis: Option<String>,

        /// Redis hash holding the definitions
        #[arg(long, default_value = "toolforge:apis")]
        catalog_key: String,

        /// JSON compile request ({ graph, apiDefinitions })
        #[arg(long, conflicts_with_all = ["graph", "catalog", "redis"])]
        request: Option<PathBuf>,

        /// Write the tool here instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Run a compiled tool against test cases in isolated contexts
    Verify {
        /// Path to the tool JSON file
        #[arg(long)]
        tool: PathBuf,

        /// YAML list of test cases
        #[arg(long)]
        tests: PathBuf,

        /// Base URL of the live service
        #[arg(long, required_unless_present = "fixtures")]
        base_url: Option<String>,

        /// Canned routes to answer calls instead of a live service
        #[arg(long, conflicts_with = "base_url")]
        fixtures: Option<PathBuf>,

        /// Verifier config YAML
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long)]
        parallel: Option<usize>,
    },
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { graph } => {
            let graph = loader::load_workflow_from_yaml(path_str(&graph)?)?;
            match Compiler::new().check(&graph) {
                Ok(order) => {
                    info!(graph_id = %graph.id, nodes = order.len(), "Graph is valid");
                    println!("{}", order.join(" -> "));
                }
                Err(e) => {
                    error!(graph_id = %graph.id, kind = e.kind(), "Graph is invalid");
                    bail!(e);
                }
            }
        }

        Commands::Compile { graph, catalog, redis, catalog_key, request, out } => {
            if let Some(request) = request {
                let request = loader::load_compile_request(path_str(&request)?)?;
                let response = api::handle_compile(&Compiler::new(), request).await;
                return emit_compile(response, out.as_deref());
            }

            let Some(graph) = graph else {
                bail!("compile needs either --request or --graph");
            };
            let graph = loader::load_workflow_from_yaml(path_str(&graph)?)?;
            let catalog: Arc<dyn ApiCatalog> = match (catalog, redis) {
                (Some(catalog), _) => {
                    let catalog = loader::load_catalog_from_yaml(path_str(&catalog)?)?;
                    info!(definitions = catalog.len(), "Catalog loaded");
                    Arc::new(catalog)
                }
                (None, Some(url)) => {
                    info!(redis = %url, key = %catalog_key, "Using Redis catalog");
                    let client = redis::Client::open(url).context("Invalid Redis URL")?;
                    Arc::new(RedisCatalog::new(client, catalog_key))
                }
                (None, None) => bail!("--graph needs either --catalog or --redis"),
            };

            let response = match Compiler::new().compile(&graph, catalog).await {
                Ok(tool) => CompileResponse::Tool { tool },
                Err(e) => {
                    error!(graph_id = %graph.id, kind = e.kind(), error = %e, "Compilation failed");
                    CompileResponse::Error { error: (&e).into() }
                }
            };
            emit_compile(response, out.as_deref())?;
        }

        Commands::Verify { tool, tests, base_url, fixtures, config, timeout_ms, parallel } => {
            let mut verifier_config = match config {
                Some(path) => loader::load_verifier_config(path_str(&path)?)?,
                None => VerifierConfig::default(),
            };
            if let Some(ms) = timeout_ms {
                verifier_config.timeout_ms = ms;
            }
            if let Some(n) = parallel {
                verifier_config.max_parallel = n;
            }

            let tool = loader::load_tool_from_json(path_str(&tool)?)?;
            let test_inputs = loader::load_test_cases_from_yaml(path_str(&tests)?)?;

            let callers: CallerFactory = match (fixtures, base_url) {
                (Some(fixtures), _) => {
                    let table = loader::load_route_table(path_str(&fixtures)?)?;
                    Arc::new(move || Arc::new(table.fresh()) as Arc<dyn HttpCaller>)
                }
                (None, Some(url)) => Arc::new(move || Arc::new(ReqwestCaller::new(&url)) as Arc<dyn HttpCaller>),
                (None, None) => bail!("verify needs either --base-url or --fixtures"),
            };

            info!(tool = %tool.name, cases = test_inputs.len(), timeout_ms = verifier_config.timeout_ms, "Verifying");
            let verifier = Verifier::new(verifier_config, callers);
            let response = api::handle_verify(&verifier, VerifyRequest { tool, test_inputs }).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            let failed = response
                .results
                .iter()
                .filter(|r| r.status != VerificationStatus::Passed)
                .count();
            if failed > 0 {
                bail!("{} of {} test cases did not pass", failed, response.results.len());
            }
        }
    }

    Ok(())
}

fn emit_compile(response: CompileResponse, out: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&response)?;
    match (&response, out) {
        (CompileResponse::Error { error }, _) => {
            println!("{}", rendered);
            bail!("compilation failed: {}", error.message);
        }
        (CompileResponse::Tool { tool }, Some(path)) => {
            fs::write(path, serde_json::to_string_pretty(tool)?)
                .with_context(|| format!("Failed to write tool to {}", path.display()))?;
            info!(tool = %tool.name, out = %path.display(), "Tool written");
        }
        (CompileResponse::Tool { tool }, None) => {
            println!("{}", serde_json::to_string_pretty(tool)?);
        }
    }
    Ok(())
}
