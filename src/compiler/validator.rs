use crate::compiler::error::GraphError;
use crate::dsl::WorkflowGraph;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Structural checks for sequential workflow graphs.
///
/// A valid graph is a single chain: one start, one end, no node with more
/// than one incoming or outgoing edge, and every node on the chain.
#[derive(Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the node ids in execution order, start first.
    pub fn validate(&self, graph: &WorkflowGraph) -> Result<Vec<String>, GraphError> {
        // 1. Indexing
        let mut id_map: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
        for (idx, node) in graph.nodes.iter().enumerate() {
            if id_map.insert(node.id.as_str(), idx).is_some() {
                return Err(GraphError::DuplicateNode { node_id: node.id.clone() });
            }
        }
        if graph.nodes.is_empty() {
            return Err(GraphError::NoStartNode);
        }

        let n = graph.nodes.len();
        let name = |idx: usize| graph.nodes[idx].id.clone();

        // 2. Adjacency & degrees
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for edge in &graph.edges {
            let resolve = |id: &str| {
                id_map.get(id).copied().ok_or_else(|| GraphError::UnknownEdgeEndpoint {
                    from: edge.source.clone(),
                    to: edge.target.clone(),
                    missing: id.to_string(),
                })
            };
            let u = resolve(&edge.source)?;
            let v = resolve(&edge.target)?;
            successors[u].push(v);
            predecessors[v].push(u);
        }

        // 3. Cycles
        let on_cycle = cycle_members(&successors, &predecessors);
        if !on_cycle.is_empty() {
            return Err(GraphError::CycleDetected {
                nodes: on_cycle.into_iter().map(name).collect(),
            });
        }

        // 4. Sequential-only
        for idx in 0..n {
            let (incoming, outgoing) = (predecessors[idx].len(), successors[idx].len());
            if incoming > 1 || outgoing > 1 {
                return Err(GraphError::BranchingNode {
                    node_id: name(idx),
                    incoming,
                    outgoing,
                });
            }
        }

        // 5. Start & end
        let starts: Vec<usize> = (0..n).filter(|&i| predecessors[i].is_empty()).collect();
        let ends: Vec<usize> = (0..n).filter(|&i| successors[i].is_empty()).collect();
        let start = match starts.as_slice() {
            [] => return Err(GraphError::NoStartNode),
            [only] => *only,
            many => {
                return Err(GraphError::MultipleStartNodes {
                    nodes: many.iter().map(|&i| name(i)).collect(),
                })
            }
        };
        match ends.as_slice() {
            [] => return Err(GraphError::NoEndNode),
            [_] => {}
            many => {
                return Err(GraphError::MultipleEndNodes {
                    nodes: many.iter().map(|&i| name(i)).collect(),
                })
            }
        }

        // 6. Walk
        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut current = Some(start);
        while let Some(idx) = current {
            if visited[idx] {
                return Err(GraphError::CycleDetected { nodes: vec![name(idx)] });
            }
            visited[idx] = true;
            order.push(name(idx));
            current = successors[idx].first().copied();
        }

        if let Some(idx) = visited.iter().position(|seen| !seen) {
            return Err(GraphError::DisconnectedNode { node_id: name(idx) });
        }

        debug!(graph_id = %graph.id, steps = order.len(), "Graph validated");
        Ok(order)
    }
}

/// Indices of nodes that lie on a cycle, in declaration order.
///
/// Peels nodes with no remaining predecessors, then nodes with no remaining
/// successors; whatever survives both passes sits on a cycle.
fn cycle_members(successors: &[Vec<usize>], predecessors: &[Vec<usize>]) -> Vec<usize> {
    let n = successors.len();
    let mut removed = vec![false; n];

    for (forward, backward) in [(successors, predecessors), (predecessors, successors)] {
        let mut remaining: Vec<usize> = (0..n)
            .map(|i| if removed[i] { 0 } else { backward[i].iter().filter(|&&p| !removed[p]).count() })
            .collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| !removed[i] && remaining[i] == 0).collect();
        while let Some(u) = queue.pop_front() {
            removed[u] = true;
            for &v in &forward[u] {
                if removed[v] {
                    continue;
                }
                remaining[v] -= 1;
                if remaining[v] == 0 {
                    queue.push_back(v);
                }
            }
        }
    }

    (0..n).filter(|&i| !removed[i]).collect()
}
