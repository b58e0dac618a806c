use crate::dsl::{WorkflowGraph, WorkflowNode, WorkflowEdge, DataMapping};
use std::collections::BTreeMap;
use serde_json::Value;

pub struct WorkflowBuilder {
    id: String,
    name: String,
    description: Option<String>,
    pub nodes: Vec<WorkflowNode>, // Public so tests can tamper with the node list directly
    edges: Vec<WorkflowEdge>,
}

impl WorkflowBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Adds a node without overrides.
    pub fn call(mut self, id: &str, api: &str) -> Self {
        self.nodes.push(WorkflowNode {
            id: id.to_string(),
            api: api.to_string(),
            overrides: BTreeMap::new(),
        });
        self
    }

    /// Starts a node that takes static overrides; finish it with `.build()`.
    pub fn node(self, id: &str, api: &str) -> NodeBuilder {
        NodeBuilder {
            workflow_builder: self,
            id: id.to_string(),
            api: api.to_string(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push(WorkflowEdge {
            source: source.to_string(),
            target: target.to_string(),
            mappings: Vec::new(),
        });
        self
    }

    /// Connects two nodes with a single `from -> to` mapping.
    pub fn connect_mapped(mut self, source: &str, target: &str, from: &str, to: &str) -> Self {
        self.edges.push(WorkflowEdge {
            source: source.to_string(),
            target: target.to_string(),
            mappings: vec![DataMapping::new(from, to)],
        });
        self
    }

    /// Adds another mapping to the most recently added edge.
    pub fn map(mut self, from: &str, to: &str) -> Self {
        if let Some(edge) = self.edges.last_mut() {
            edge.mappings.push(DataMapping::new(from, to));
        }
        self
    }

    pub fn build(self) -> WorkflowGraph {
        WorkflowGraph {
            id: self.id,
            name: self.name,
            description: self.description,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

pub struct NodeBuilder {
    workflow_builder: WorkflowBuilder,
    id: String,
    api: String,
    overrides: BTreeMap<String, Value>,
}

impl NodeBuilder {
    pub fn set(mut self, param: &str, value: impl Into<Value>) -> Self {
        self.overrides.insert(param.to_string(), value.into());
        self
    }

    pub fn build(mut self) -> WorkflowBuilder {
        self.workflow_builder.nodes.push(WorkflowNode {
            id: self.id,
            api: self.api,
            overrides: self.overrides,
        });
        self.workflow_builder
    }
}
