use crate::catalog::{ApiDefinition, ParameterLocation};
use crate::compiler::error::PlanError;
use crate::compiler::schema;
use crate::dsl::path::{FieldPath, Segment};
use crate::dsl::{WorkflowGraph, WorkflowNode};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 执行计划: 按顺序排列、已解析的调用序列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub graph_id: String,
    pub graph_name: String,
    pub description: Option<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub node_id: String,
    pub api: ApiDefinition,
    pub overrides: BTreeMap<String, Value>,
    /// Mappings applied to the previous step's response; empty for the first step.
    pub mappings: Vec<ResolvedMapping>,
}

/// A mapping whose paths were checked against the declared schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMapping {
    pub from: FieldPath,
    pub to: FieldPath,
}

/// Largest array index a mapping may write into.
pub const MAX_TARGET_INDEX: usize = 255;

#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Builds the plan for an already validated path.
    ///
    /// `definitions` is the catalog snapshot fetched for this compilation;
    /// planning never touches the catalog itself.
    pub fn plan(
        &self,
        path: &[String],
        graph: &WorkflowGraph,
        definitions: &HashMap<String, ApiDefinition>,
    ) -> Result<ExecutionPlan, PlanError> {
        let mut steps: Vec<PlanStep> = Vec::with_capacity(path.len());
        // Fields of the tool input, i.e. the first step's free parameters
        let mut input_fields: BTreeSet<String> = BTreeSet::new();

        for node_id in path {
            let node = graph.node(node_id).ok_or_else(|| PlanError::UnknownNode {
                node_id: node_id.clone(),
            })?;
            let api = definitions.get(&node.api).cloned().ok_or_else(|| PlanError::UnknownApi {
                node_id: node.id.clone(),
                api: node.api.clone(),
            })?;

            for name in node.overrides.keys() {
                if api.parameter(name).is_none() {
                    return Err(PlanError::UnknownParameter {
                        node_id: node.id.clone(),
                        parameter: name.clone(),
                    });
                }
            }
            check_placeholders(node, &api)?;

            let mappings = match steps.last() {
                None => {
                    input_fields = api
                        .parameters
                        .iter()
                        .filter(|p| !node.overrides.contains_key(&p.name))
                        .map(|p| p.name.clone())
                        .collect();
                    Vec::new()
                }
                Some(previous) => {
                    let mappings = self.resolve_mappings(previous, node, &api, graph)?;
                    check_satisfied(node, &api, &mappings, &input_fields)?;
                    mappings
                }
            };

            steps.push(PlanStep {
                node_id: node.id.clone(),
                api,
                overrides: node.overrides.clone(),
                mappings,
            });
        }

        Ok(ExecutionPlan {
            graph_id: graph.id.clone(),
            graph_name: graph.name.clone(),
            description: graph.description.clone(),
            steps,
        })
    }

    fn resolve_mappings(
        &self,
        previous: &PlanStep,
        node: &WorkflowNode,
        api: &ApiDefinition,
        graph: &WorkflowGraph,
    ) -> Result<Vec<ResolvedMapping>, PlanError> {
        let mut resolved = Vec::new();

        for edge in graph.incoming(&node.id) {
            for mapping in &edge.mappings {
                let invalid = |path: &str, reason: String| PlanError::InvalidMappingPath {
                    node_id: node.id.clone(),
                    path: path.to_string(),
                    reason,
                };

                if edge.source != previous.node_id {
                    return Err(invalid(&mapping.from, format!("edge source `{}` is not the preceding step", edge.source)));
                }

                // 1. Syntax
                let from = FieldPath::parse(&mapping.from).map_err(|e| invalid(&mapping.from, e.to_string()))?;
                let to = FieldPath::parse(&mapping.to).map_err(|e| invalid(&mapping.to, e.to_string()))?;

                // 2. Source against the predecessor's response shape
                let (_, response) = previous.api.success_response().ok_or_else(|| {
                    invalid(&mapping.from, format!("api `{}` declares no 2xx response", previous.api.id))
                })?;
                let source_schema = from
                    .resolve_schema(response)
                    .map_err(|e| invalid(&mapping.from, e.to_string()))?;

                // 3. Target against the declared parameters
                let param_name = to.head_field().ok_or_else(|| {
                    invalid(&mapping.to, "target must start with a parameter name".to_string())
                })?;
                let param = api.parameter(param_name).ok_or_else(|| {
                    invalid(&mapping.to, format!("api `{}` declares no parameter `{}`", api.id, param_name))
                })?;
                let nested = to.tail();
                if !nested.is_empty() && param.location != ParameterLocation::Body {
                    return Err(invalid(&mapping.to, "only body parameters accept nested targets".to_string()));
                }
                if let Some(idx) = nested.segments().iter().find_map(|s| match s {
                    Segment::Index(i) if *i > MAX_TARGET_INDEX => Some(*i),
                    _ => None,
                }) {
                    return Err(invalid(
                        &mapping.to,
                        format!("index {} exceeds the largest writable index {}", idx, MAX_TARGET_INDEX),
                    ));
                }
                let target_schema = nested
                    .resolve_schema(&param.schema)
                    .map_err(|e| invalid(&mapping.to, e.to_string()))?;

                // 4. Declared types
                if !schema::is_compatible(source_schema, target_schema) {
                    return Err(PlanError::TypeMismatch {
                        node_id: node.id.clone(),
                        from: mapping.from.clone(),
                        to: mapping.to.clone(),
                        found: schema::describe_types(source_schema),
                        expected: schema::describe_types(target_schema),
                    });
                }

                resolved.push(ResolvedMapping { from, to });
            }
        }

        Ok(resolved)
    }
}

fn check_satisfied(
    node: &WorkflowNode,
    api: &ApiDefinition,
    mappings: &[ResolvedMapping],
    input_fields: &BTreeSet<String>,
) -> Result<(), PlanError> {
    for param in api.parameters.iter().filter(|p| p.is_required()) {
        let mapped = mappings.iter().any(|m| m.to.head_field() == Some(param.name.as_str()));
        if !(mapped || node.overrides.contains_key(&param.name) || input_fields.contains(&param.name)) {
            return Err(PlanError::UnsatisfiedParameter {
                node_id: node.id.clone(),
                parameter: param.name.clone(),
            });
        }
    }
    Ok(())
}

/// Every `{name}` in the path template must be a declared path parameter.
fn check_placeholders(node: &WorkflowNode, api: &ApiDefinition) -> Result<(), PlanError> {
    let mut rest = api.path.as_str();
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        let declared = api
            .parameter(name)
            .is_some_and(|p| p.location == ParameterLocation::Path);
        if !declared {
            return Err(PlanError::UndeclaredPlaceholder {
                node_id: node.id.clone(),
                api: api.id.clone(),
                placeholder: name.to_string(),
            });
        }
        rest = &after[close + 1..];
    }
    Ok(())
}
