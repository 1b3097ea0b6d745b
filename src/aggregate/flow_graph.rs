use std::collections::HashMap;

use serde::Serialize;

use crate::normalize::{short_address, Direction, Transfer};
use crate::pipeline::NetworkBundle;

/// Fraction of the maximum edge value below which an edge is considered
/// dust and dropped from the graph.
const NOISE_FLOOR: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[serde(rename = "self")]
    Account,
    Source,
    Sink,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub label: String,
    pub role: NodeRole,
    pub address: String,
}

/// Node indices refer into [`FlowGraph::nodes`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub source: usize,
    pub target: usize,
    pub value: f64,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

/// Build the single-network flow graph for one bundle.
///
/// The account's own node is inserted first and every edge connects it to a
/// counterparty node; a counterparty appearing on both sides gets two nodes,
/// one per role, since direction determines role. Inflow and outflow values
/// aggregate per (counterparty, token) pair, then edges below
/// [`NOISE_FLOOR`] of the maximum are dropped.
pub fn build_flow_graph(bundle: &NetworkBundle, address: &str) -> FlowGraph {
    let mut nodes = vec![FlowNode {
        label: short_address(address),
        role: NodeRole::Account,
        address: address.to_string(),
    }];
    let mut node_index: HashMap<(String, NodeRole), usize> = HashMap::new();
    // (counterparty node, token) -> aggregate value
    let mut edge_totals: HashMap<(usize, String), f64> = HashMap::new();

    let mut absorb = |transfers: &[Transfer], role: NodeRole| {
        for t in transfers {
            let key = (t.counterparty.to_lowercase(), role);
            let idx = *node_index.entry(key).or_insert_with(|| {
                nodes.push(FlowNode {
                    label: short_address(&t.counterparty),
                    role,
                    address: t.counterparty.clone(),
                });
                nodes.len() - 1
            });
            *edge_totals.entry((idx, t.token.clone())).or_insert(0.0) +=
                t.usd.unwrap_or(t.amount);
        }
    };

    absorb(&bundle.incoming, NodeRole::Source);
    absorb(&bundle.outgoing, NodeRole::Sink);

    let mut edges: Vec<FlowEdge> = edge_totals
        .into_iter()
        .map(|((idx, token), value)| {
            let (source, target) = match nodes[idx].role {
                NodeRole::Source => (idx, 0),
                _ => (0, idx),
            };
            FlowEdge {
                source,
                target,
                value,
                token,
            }
        })
        .collect();

    let max_value = edges.iter().map(|e| e.value).fold(0.0_f64, f64::max);
    edges.retain(|e| e.value >= max_value * NOISE_FLOOR);
    edges.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.token.cmp(&b.token)));

    // Filtering can leave counterparty nodes with no surviving edge; drop
    // them and re-index. The account node always stays at index 0.
    let mut connected = vec![false; nodes.len()];
    connected[0] = true;
    for edge in &edges {
        connected[edge.source] = true;
        connected[edge.target] = true;
    }
    let mut remap = vec![0usize; nodes.len()];
    let mut kept = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.into_iter().enumerate() {
        if connected[i] {
            remap[i] = kept.len();
            kept.push(node);
        }
    }
    for edge in &mut edges {
        edge.source = remap[edge.source];
        edge.target = remap[edge.target];
    }

    FlowGraph { nodes: kept, edges }
}
