use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::timeline::{entry_from_transfer, TimelineEntry};
use crate::normalize::{short_address, Direction, Transfer};
use crate::pipeline::NetworkBundle;

/// Cap on the combined cross-network flow list.
const MAX_FLOWS: usize = 15;

/// Key used in the summary maps for the cross-network aggregate.
pub const ALL_NETWORKS: &str = "all";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub transfer_count: usize,
    /// Compact magnitude strings (`~$1.2M`, `~$45K`, `~$100`).
    pub inflow: String,
    pub outflow: String,
    pub counterparties: usize,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
}

/// One counterparty<->wallet edge in a summary flow list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub counterparty: String,
    pub counterparty_address: String,
    pub direction: Direction,
    pub token: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllTransfers {
    pub incoming: Vec<TimelineEntry>,
    pub outgoing: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiNetworkSummary {
    /// Keyed by network id rendered as a string.
    pub per_network_stats: HashMap<String, NetworkStats>,
    pub aggregate_stats: NetworkStats,
    /// Per-network flow lists plus an [`ALL_NETWORKS`] entry capped to the
    /// top [`MAX_FLOWS`] edges by value.
    pub flows_per_network: HashMap<String, Vec<FlowSummary>>,
    pub all_transfers: AllTransfers,
}

/// Compact magnitude rendering for summary cards.
pub fn format_compact(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("~${:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("~${:.0}K", (value / 1_000.0).round())
    } else {
        format!("~${:.0}", value.round())
    }
}

#[derive(Default)]
struct StatsAccumulator {
    transfer_count: usize,
    inflow: f64,
    outflow: f64,
    counterparties: HashSet<String>,
    active_from: Option<DateTime<Utc>>,
    active_to: Option<DateTime<Utc>>,
}

impl StatsAccumulator {
    fn absorb(&mut self, t: &Transfer) {
        self.transfer_count += 1;
        // USD estimate when available, raw token amount otherwise.
        let value = t.usd.unwrap_or(t.amount);
        match t.direction {
            Direction::In => self.inflow += value,
            Direction::Out => self.outflow += value,
        }
        self.counterparties.insert(t.counterparty.to_lowercase());
        if let Some(ts) = t.timestamp {
            self.active_from = Some(self.active_from.map_or(ts, |cur| cur.min(ts)));
            self.active_to = Some(self.active_to.map_or(ts, |cur| cur.max(ts)));
        }
    }

    fn finish(self) -> NetworkStats {
        NetworkStats {
            transfer_count: self.transfer_count,
            inflow: format_compact(self.inflow),
            outflow: format_compact(self.outflow),
            counterparties: self.counterparties.len(),
            active_from: self.active_from,
            active_to: self.active_to,
        }
    }
}

fn flows_for<'a>(transfers: impl Iterator<Item = &'a Transfer>) -> Vec<FlowSummary> {
    // Composite key, not a concatenated string: collisions are impossible.
    let mut totals: HashMap<(String, String, Direction), (String, f64)> = HashMap::new();
    for t in transfers {
        let key = (t.counterparty.to_lowercase(), t.token.clone(), t.direction);
        let entry = totals
            .entry(key)
            .or_insert_with(|| (t.counterparty.clone(), 0.0));
        entry.1 += t.usd.unwrap_or(t.amount);
    }
    let mut flows: Vec<FlowSummary> = totals
        .into_iter()
        .map(|((_, token, direction), (address, value))| FlowSummary {
            counterparty: short_address(&address),
            counterparty_address: address,
            direction,
            token,
            value: (value * 100.0).round() / 100.0,
        })
        .collect();
    flows.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.token.cmp(&b.token)));
    flows
}

/// Build the multi-network summary over all fetched bundles.
pub fn build_multi_network_summary(
    bundles: &HashMap<u64, NetworkBundle>,
    _address: &str,
) -> MultiNetworkSummary {
    let mut per_network_stats = HashMap::new();
    let mut flows_per_network = HashMap::new();
    let mut union = StatsAccumulator::default();
    let mut all_flows: Vec<FlowSummary> = Vec::new();
    let mut incoming: Vec<TimelineEntry> = Vec::new();
    let mut outgoing: Vec<TimelineEntry> = Vec::new();

    for (network_id, bundle) in bundles {
        let mut acc = StatsAccumulator::default();
        for t in bundle.incoming.iter().chain(bundle.outgoing.iter()) {
            acc.absorb(t);
            union.absorb(t);
        }
        per_network_stats.insert(network_id.to_string(), acc.finish());

        let flows = flows_for(bundle.incoming.iter().chain(bundle.outgoing.iter()));
        all_flows.extend(flows.iter().cloned());
        flows_per_network.insert(network_id.to_string(), flows);

        incoming.extend(bundle.incoming.iter().filter_map(entry_from_transfer));
        outgoing.extend(bundle.outgoing.iter().filter_map(entry_from_transfer));
    }

    all_flows.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.token.cmp(&b.token)));
    all_flows.truncate(MAX_FLOWS);
    flows_per_network.insert(ALL_NETWORKS.to_string(), all_flows);

    incoming.sort_by(|a, b| b.date.cmp(&a.date));
    outgoing.sort_by(|a, b| b.date.cmp(&a.date));

    MultiNetworkSummary {
        per_network_stats,
        aggregate_stats: union.finish(),
        flows_per_network,
        all_transfers: AllTransfers { incoming, outgoing },
    }
}
