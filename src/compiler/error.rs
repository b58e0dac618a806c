use crate::catalog::CatalogError;
use thiserror::Error;

/// Structural problems in the submitted graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph has no start node (every node has an incoming edge)")]
    NoStartNode,
    #[error("graph has no end node (every node has an outgoing edge)")]
    NoEndNode,
    #[error("graph has multiple start nodes: {}", nodes.join(", "))]
    MultipleStartNodes { nodes: Vec<String> },
    #[error("graph has multiple end nodes: {}", nodes.join(", "))]
    MultipleEndNodes { nodes: Vec<String> },
    #[error("node `{node_id}` is not reachable from the start node")]
    DisconnectedNode { node_id: String },
    #[error("cycle detected through: {}", nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },
    #[error("node `{node_id}` branches ({incoming} incoming, {outgoing} outgoing); only sequential graphs are supported")]
    BranchingNode {
        node_id: String,
        incoming: usize,
        outgoing: usize,
    },
    #[error("duplicate node id `{node_id}`")]
    DuplicateNode { node_id: String },
    #[error("edge `{from}` -> `{to}` references unknown node `{missing}`")]
    UnknownEdgeEndpoint {
        from: String,
        to: String,
        missing: String,
    },
}

impl GraphError {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::NoStartNode => "NoStartNode",
            GraphError::NoEndNode => "NoEndNode",
            GraphError::MultipleStartNodes { .. } => "MultipleStartNodes",
            GraphError::MultipleEndNodes { .. } => "MultipleEndNodes",
            GraphError::DisconnectedNode { .. } => "DisconnectedNode",
            GraphError::CycleDetected { .. } => "CycleDetected",
            GraphError::BranchingNode { .. } => "BranchingNode",
            GraphError::DuplicateNode { .. } => "DuplicateNode",
            GraphError::UnknownEdgeEndpoint { .. } => "UnknownEdgeEndpoint",
        }
    }

    /// The first offending node, when the error names one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            GraphError::NoStartNode | GraphError::NoEndNode => None,
            GraphError::MultipleStartNodes { nodes }
            | GraphError::MultipleEndNodes { nodes }
            | GraphError::CycleDetected { nodes } => nodes.first().map(String::as_str),
            GraphError::DisconnectedNode { node_id }
            | GraphError::BranchingNode { node_id, .. }
            | GraphError::DuplicateNode { node_id } => Some(node_id.as_str()),
            GraphError::UnknownEdgeEndpoint { missing, .. } => Some(missing.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("node `{node_id}` is not part of the graph")]
    UnknownNode { node_id: String },
    #[error("node `{node_id}` references unknown api `{api}`")]
    UnknownApi { node_id: String, api: String },
    #[error("node `{node_id}`: invalid mapping path `{path}`: {reason}")]
    InvalidMappingPath {
        node_id: String,
        path: String,
        reason: String,
    },
    #[error("node `{node_id}`: `{from}` ({found}) cannot be mapped to `{to}` ({expected})")]
    TypeMismatch {
        node_id: String,
        from: String,
        to: String,
        found: String,
        expected: String,
    },
    #[error("node `{node_id}` overrides `{parameter}`, which its api does not declare")]
    UnknownParameter { node_id: String, parameter: String },
    #[error("node `{node_id}`: required parameter `{parameter}` has no override, mapping or tool input")]
    UnsatisfiedParameter { node_id: String, parameter: String },
    #[error("node `{node_id}`: path of api `{api}` uses placeholder `{placeholder}`, which is not a declared path parameter")]
    UndeclaredPlaceholder {
        node_id: String,
        api: String,
        placeholder: String,
    },
}

impl PlanError {
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::UnknownNode { .. } => "UnknownNode",
            PlanError::UnknownApi { .. } => "UnknownApi",
            PlanError::InvalidMappingPath { .. } => "InvalidMappingPath",
            PlanError::TypeMismatch { .. } => "TypeMismatch",
            PlanError::UnknownParameter { .. } => "UnknownParameter",
            PlanError::UnsatisfiedParameter { .. } => "UnsatisfiedParameter",
            PlanError::UndeclaredPlaceholder { .. } => "UndeclaredPlaceholder",
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            PlanError::UnknownNode { node_id }
            | PlanError::UnknownApi { node_id, .. }
            | PlanError::InvalidMappingPath { node_id, .. }
            | PlanError::TypeMismatch { node_id, .. }
            | PlanError::UnknownParameter { node_id, .. }
            | PlanError::UnsatisfiedParameter { node_id, .. }
            | PlanError::UndeclaredPlaceholder { node_id, .. } => node_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("plan has no steps")]
    EmptyPlan,
    #[error("node `{node_id}`: api `{api}` declares no 2xx response")]
    NoSuccessResponse { node_id: String, api: String },
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl CompileError {
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Graph(e) => e.kind(),
            CompileError::Plan(e) => e.kind(),
            CompileError::Schema(SchemaError::EmptyPlan) => "EmptyPlan",
            CompileError::Schema(SchemaError::NoSuccessResponse { .. }) => "NoSuccessResponse",
            CompileError::Catalog(_) => "CatalogUnavailable",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            CompileError::Graph(e) => e.node_id(),
            CompileError::Plan(e) => Some(e.node_id()),
            CompileError::Schema(SchemaError::NoSuccessResponse { node_id, .. }) => Some(node_id.as_str()),
            CompileError::Schema(SchemaError::EmptyPlan) | CompileError::Catalog(_) => None,
        }
    }
}
