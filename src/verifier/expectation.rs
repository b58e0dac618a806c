use evalexpr::{eval_with_context, HashMapContext, ContextWithMutableVariables, DefaultNumericTypes};
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// What a test case expects from the tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Output equals this value exactly.
    Equals(Value),
    /// Every field of this value is present in the output with the same value.
    Subset(Value),
    /// Boolean expression over the output's fields, e.g. `name == "X" && count > 2`.
    /// Nested fields are addressed with dots: `user.id`, `items.0.id`.
    /// Characters in keys that cannot appear in a variable name become `_`,
    /// so `first-name` is read as `first_name`.
    Predicate(String),
    /// The tool must stop at this step with this status.
    StepFailure { step_index: usize, status_code: u16 },
}

impl Expectation {
    /// `Err` carries a human-readable reason for the mismatch.
    pub fn check_output(&self, output: &Value) -> Result<(), String> {
        match self {
            Expectation::Equals(expected) => {
                if expected == output {
                    Ok(())
                } else {
                    Err(format!("expected {}, got {}", expected, output))
                }
            }
            Expectation::Subset(expected) => {
                if is_subset(expected, output) {
                    Ok(())
                } else {
                    Err(format!("{} is not contained in {}", expected, output))
                }
            }
            Expectation::Predicate(expr) => match evaluate_predicate(expr, output)? {
                true => Ok(()),
                false => Err(format!("predicate `{}` is false", expr)),
            },
            Expectation::StepFailure { step_index, status_code } => Err(format!(
                "expected step {} to fail with {}, but the tool succeeded",
                step_index, status_code
            )),
        }
    }

    pub fn expects_step_failure(&self, step_index: usize, status_code: u16) -> bool {
        matches!(self, Expectation::StepFailure { step_index: s, status_code: c } if *s == step_index && *c == status_code)
    }
}

fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(want), Value::Object(have)) => want
            .iter()
            .all(|(k, v)| have.get(k).is_some_and(|h| is_subset(v, h))),
        _ => expected == actual,
    }
}

fn evaluate_predicate(expr: &str, output: &Value) -> Result<bool, String> {
    let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
    let mut fields = Vec::new();
    flatten("", output, &mut fields);

    for (k, v) in fields {
        let ev = match v {
            Value::String(s) => Some(evalexpr::Value::String(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() { Some(evalexpr::Value::Int(i)) }
                else { n.as_f64().map(evalexpr::Value::Float) }
            }
            Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
            _ => None,
        };
        if let Some(ev) = ev {
            let _ = eval_ctx.set_value(k, ev);
        }
    }

    match eval_with_context(expr, &eval_ctx) {
        Ok(evalexpr::Value::Boolean(b)) => Ok(b),
        Ok(other) => Err(format!("predicate `{}` evaluated to {:?}, not a boolean", expr, other)),
        Err(e) => Err(format!("predicate `{}` could not be evaluated: {}", expr, e)),
    }
}

/// Dotted-key view of a JSON document; a scalar root is bound as `output`.
fn flatten<'a>(prefix: &str, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    let key = |k: &str| if prefix.is_empty() { k.to_string() } else { format!("{}.{}", prefix, k) };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(&variable_name(k)), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&key(&i.to_string()), v, out);
            }
        }
        scalar => {
            let name = if prefix.is_empty() { "output".to_string() } else { prefix.to_string() };
            out.push((name, scalar));
        }
    }
}

fn variable_name(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
