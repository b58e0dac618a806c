use crate::compiler::planner::{ExecutionPlan, PlanStep};
use crate::runtime::tool::{GeneratedTool, StepMapping, ToolStep};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, plan: &ExecutionPlan, input_schema: Value, output_schema: Value) -> GeneratedTool {
        let steps: Vec<ToolStep> = plan.steps.iter().map(to_tool_step).collect();

        let name = match tool_name(&plan.graph_name) {
            name if name.is_empty() => tool_name(&plan.graph_id),
            name => name,
        };
        let description = plan
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| describe_steps(&plan.steps));

        GeneratedTool {
            id: Uuid::new_v4(),
            name,
            description,
            input_schema,
            output_schema,
            steps,
        }
    }
}

fn to_tool_step(step: &PlanStep) -> ToolStep {
    ToolStep {
        node_id: step.node_id.clone(),
        api_id: step.api.id.clone(),
        method: step.api.method,
        path: step.api.path.clone(),
        parameters: step.api.parameters.clone(),
        overrides: step.overrides.clone(),
        mappings: step
            .mappings
            .iter()
            .map(|m| StepMapping { from: m.from.clone(), to: m.to.clone() })
            .collect(),
    }
}

/// snake_case identifier derived from free text ("Fetch item details" -> "fetch_item_details").
pub fn tool_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !name.is_empty() {
                name.push('_');
            }
            pending_sep = false;
            name.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    name
}

fn describe_steps(steps: &[PlanStep]) -> String {
    let calls: Vec<String> = steps
        .iter()
        .map(|s| match &s.api.summary {
            Some(summary) => format!("{} {} ({})", s.api.method, s.api.path, summary),
            None => format!("{} {}", s.api.method, s.api.path),
        })
        .collect();
    match calls.len() {
        1 => format!("Calls {}.", calls[0]),
        n => format!("Calls {} APIs in sequence: {}.", n, calls.join(" -> ")),
    }
}
