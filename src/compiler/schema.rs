use crate::compiler::error::SchemaError;
use crate::compiler::planner::ExecutionPlan;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;

/// Declared JSON types of a schema, or `None` when the schema is untyped.
///
/// `nullable: true` adds `null`; a schema with `properties` or `items` but no
/// `type` is taken as an object or array respectively.
pub fn declared_types(schema: &Value) -> Option<BTreeSet<String>> {
    let mut types: BTreeSet<String> = match schema.get("type") {
        Some(Value::String(t)) => BTreeSet::from([t.clone()]),
        Some(Value::Array(list)) => list.iter().filter_map(|t| t.as_str().map(str::to_string)).collect(),
        _ if schema.get("properties").is_some() => BTreeSet::from(["object".to_string()]),
        _ if schema.get("items").is_some() => BTreeSet::from(["array".to_string()]),
        _ => return None,
    };
    if schema.get("nullable").and_then(Value::as_bool) == Some(true) {
        types.insert("null".to_string());
    }
    if types.is_empty() { None } else { Some(types) }
}

/// Whether every value the source schema admits is admitted by the target.
///
/// Partial matches (a nullable source into a non-null target, an untyped
/// source into a typed target) are rejected.
pub fn is_compatible(source: &Value, target: &Value) -> bool {
    let Some(target_types) = declared_types(target) else {
        return true;
    };
    let Some(source_types) = declared_types(source) else {
        return false;
    };
    source_types
        .iter()
        .all(|t| target_types.contains(t) || (t == "integer" && target_types.contains("number")))
}

pub fn describe_types(schema: &Value) -> String {
    match declared_types(schema) {
        None => "any".to_string(),
        Some(types) if types.len() == 1 => types.into_iter().collect(),
        Some(types) => format!("[{}]", types.into_iter().collect::<Vec<_>>().join(", ")),
    }
}

/// Validates `value` against `schema`, reporting every violation with its
/// instance location. OpenAPI's `nullable: true` is honoured.
pub fn conforms(schema: &Value, value: &Value) -> Result<(), String> {
    let schema = with_nullable_types(schema);
    let compiled = jsonschema::JSONSchema::compile(&schema)
        .map_err(|e| format!("schema is invalid: {}", e))?;
    let result = compiled.validate(value);
    match result {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|err| {
                let at = err.instance_path.to_string();
                format!("`{}`: {}", if at.is_empty() { "/" } else { at.as_str() }, err)
            })
            .collect::<Vec<String>>()
            .join("; ")),
    }
}

/// Rewrites `nullable: true` into a `null` entry of `type`, at every depth.
fn with_nullable_types(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), with_nullable_types(v)))
                .collect();
            if out.get("nullable").and_then(Value::as_bool) == Some(true) {
                let widened = match out.get("type") {
                    Some(Value::String(t)) => Some(json!([t, "null"])),
                    Some(Value::Array(list)) if !list.contains(&json!("null")) => {
                        let mut list = list.clone();
                        list.push(json!("null"));
                        Some(Value::Array(list))
                    }
                    _ => None,
                };
                if let Some(types) = widened {
                    out.insert("type".to_string(), types);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(with_nullable_types).collect()),
        other => other.clone(),
    }
}

/// Derives the tool's input and output contract from a plan.
#[derive(Debug, Default)]
pub struct SchemaInferencer;

impl SchemaInferencer {
    pub fn new() -> Self {
        Self
    }

    /// Returns `(input_schema, output_schema)`.
    pub fn infer(&self, plan: &ExecutionPlan) -> Result<(Value, Value), SchemaError> {
        let first = plan.steps.first().ok_or(SchemaError::EmptyPlan)?;
        let last = plan.steps.last().ok_or(SchemaError::EmptyPlan)?;

        // 1. Input: first step's parameters that no override pins down
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &first.api.parameters {
            if first.overrides.contains_key(&param.name) {
                continue;
            }
            properties.insert(param.name.clone(), param.schema.clone());
            if param.is_required() {
                required.push(Value::String(param.name.clone()));
            }
        }
        let mut input = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            input["required"] = Value::Array(required);
        }

        // 2. Output: last step's lowest 2xx response
        let (_, output) = last.api.success_response().ok_or_else(|| SchemaError::NoSuccessResponse {
            node_id: last.node_id.clone(),
            api: last.api.id.clone(),
        })?;

        Ok((input, output.clone()))
    }
}
