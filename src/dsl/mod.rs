pub mod builder;
pub mod path;

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// 编辑器提交的工作流图 (只读输入，编译器不会修改)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowGraph {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

/// 图中的一个 API 调用节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    /// Identifier of the ApiDefinition this node calls.
    pub api: String,
    /// Static parameter values, keyed by parameter name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<DataMapping>,
}

/// Moves one field of the source node's response into the target node's request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataMapping {
    /// Extraction path, applied to the source node's response body.
    pub from: String,
    /// Injection path; the first segment names a parameter of the target API.
    pub to: String,
}

impl DataMapping {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges whose target is `node_id`, in declaration order.
    pub fn incoming(&self, node_id: &str) -> impl Iterator<Item = &WorkflowEdge> {
        self.edges.iter().filter(move |e| e.target == node_id)
    }
}
