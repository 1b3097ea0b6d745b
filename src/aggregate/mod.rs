pub mod flow_graph;
pub mod summary;
pub mod timeline;

pub use flow_graph::{build_flow_graph, FlowEdge, FlowGraph, FlowNode, NodeRole};
pub use summary::{
    build_multi_network_summary, format_compact, FlowSummary, MultiNetworkSummary, NetworkStats,
};
pub use timeline::{build_timeline, TimelineEntry};
