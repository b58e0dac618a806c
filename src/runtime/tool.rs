use crate::catalog::{HttpMethod, Parameter, ParameterLocation};
use crate::compiler::schema;
use crate::dsl::path::FieldPath;
use crate::runtime::http::{HttpCaller, HttpRequest};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use urlencoding::encode;
use uuid::Uuid;

/// 编译产物：带类型契约的可执行工具
///
/// The descriptor is plain data; the only effect it can perform goes through
/// the [`HttpCaller`] handed to [`GeneratedTool::invoke`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTool {
    /// Fresh for every compilation.
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub steps: Vec<ToolStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStep {
    pub node_id: String,
    pub api_id: String,
    pub method: HttpMethod,
    pub path: String,
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<StepMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMapping {
    pub from: FieldPath,
    pub to: FieldPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("step {step_index} returned status {status_code}")]
    StepFailed { step_index: usize, status_code: u16 },
    #[error("input rejected: {message}")]
    InvalidInput { message: String },
    #[error("step {step_index}: no value for parameter `{parameter}`")]
    MissingParameter { step_index: usize, parameter: String },
    #[error("step {step_index}: `{path}` is absent from the previous response")]
    MissingMappedValue { step_index: usize, path: String },
    #[error("step {step_index}: {message}")]
    InjectFailed { step_index: usize, message: String },
    #[error("step {step_index}: call failed: {message}")]
    Transport { step_index: usize, message: String },
}

impl GeneratedTool {
    /// Runs every step in order and returns the last response body.
    ///
    /// Stops at the first non-2xx response with [`ToolError::StepFailed`].
    pub async fn invoke(&self, input: &Value, caller: &dyn HttpCaller) -> Result<Value, ToolError> {
        self.validate_input(input)?;

        let mut previous: Option<Value> = None;
        for (step_index, step) in self.steps.iter().enumerate() {
            let request = step.build_request(step_index, input, previous.as_ref())?;
            debug!(tool = %self.name, step_index, method = %request.method, path = %request.path, "Calling");

            let response = caller.call(request).await.map_err(|e| ToolError::Transport {
                step_index,
                message: format!("{:#}", e),
            })?;

            if !response.is_success() {
                return Err(ToolError::StepFailed {
                    step_index,
                    status_code: response.status,
                });
            }
            previous = Some(response.body);
        }

        Ok(previous.unwrap_or(Value::Null))
    }

    pub fn validate_input(&self, input: &Value) -> Result<(), ToolError> {
        schema::conforms(&self.input_schema, input).map_err(|message| ToolError::InvalidInput { message })
    }

    /// Optional caller-side check; `invoke` never asserts its own output.
    pub fn conforms_to_output(&self, output: &Value) -> bool {
        schema::conforms(&self.output_schema, output).is_ok()
    }

    /// `(method, path template)` per step, in call order.
    pub fn call_sequence(&self) -> Vec<(HttpMethod, String)> {
        self.steps.iter().map(|s| (s.method, s.path.clone())).collect()
    }
}

impl ToolStep {
    fn build_request(&self, step_index: usize, input: &Value, previous: Option<&Value>) -> Result<HttpRequest, ToolError> {
        // 1. Values: tool input, then overrides, then mapped values
        let mut values = Value::Object(Map::new());
        if let (Some(fields), Some(target)) = (input.as_object(), values.as_object_mut()) {
            for param in &self.parameters {
                if let Some(v) = fields.get(&param.name) {
                    target.insert(param.name.clone(), v.clone());
                }
            }
        }
        if let Some(target) = values.as_object_mut() {
            for (name, v) in &self.overrides {
                target.insert(name.clone(), v.clone());
            }
        }
        if let Some(response) = previous {
            for mapping in &self.mappings {
                let extracted = mapping.from.extract(response).ok_or_else(|| ToolError::MissingMappedValue {
                    step_index,
                    path: mapping.from.to_string(),
                })?;
                mapping
                    .to
                    .inject(&mut values, extracted.clone())
                    .map_err(|e| ToolError::InjectFailed { step_index, message: e.to_string() })?;
            }
        }

        // 2. Split by location
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut path = self.path.clone();
        let mut query = Vec::new();
        let mut body = Map::new();

        for param in &self.parameters {
            let value = values.get(&param.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if param.is_required() {
                    return Err(ToolError::MissingParameter {
                        step_index,
                        parameter: param.name.clone(),
                    });
                }
                continue;
            };
            match param.location {
                ParameterLocation::Path => {
                    path = path.replace(&format!("{{{}}}", param.name), &encode(&scalar_text(value)));
                }
                ParameterLocation::Query => match value {
                    Value::Array(items) => {
                        for item in items {
                            query.push((param.name.clone(), scalar_text(item)));
                        }
                    }
                    other => query.push((param.name.clone(), scalar_text(other))),
                },
                ParameterLocation::Body => {
                    body.insert(param.name.clone(), value.clone());
                }
            }
        }

        if let Some(placeholder) = unresolved_placeholder(&path) {
            return Err(ToolError::MissingParameter { step_index, parameter: placeholder });
        }

        let has_body_params = self.parameters.iter().any(|p| p.location == ParameterLocation::Body);
        Ok(HttpRequest {
            method: self.method,
            path,
            query,
            body: has_body_params.then_some(Value::Object(body)),
        })
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unresolved_placeholder(path: &str) -> Option<String> {
    let start = path.find('{')?;
    let end = path[start..].find('}')? + start;
    Some(path[start + 1..end].to_string())
}

