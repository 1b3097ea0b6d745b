use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::normalize::{short_address, Direction, Transfer};
use crate::pipeline::NetworkBundle;

/// One row of the cross-network chronological timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub date: DateTime<Utc>,
    pub direction: Direction,
    pub amount: f64,
    pub token: String,
    /// USD estimate when the token has one, else the raw token amount as a
    /// non-financial fallback display value.
    pub usd: f64,
    pub has_usd_estimate: bool,
    pub network_id: u64,
    pub counterparty: String,
    pub counterparty_address: String,
}

pub(crate) fn entry_from_transfer(t: &Transfer) -> Option<TimelineEntry> {
    // Entries without a parsable execution time cannot be placed.
    let date = t.timestamp?;
    Some(TimelineEntry {
        date,
        direction: t.direction,
        amount: t.amount,
        token: t.token.clone(),
        usd: t.usd.unwrap_or(t.amount),
        has_usd_estimate: t.has_usd_estimate,
        network_id: t.network_id,
        counterparty: short_address(&t.counterparty),
        counterparty_address: t.counterparty.clone(),
    })
}

/// Flatten every network's transfers into one sequence ordered by date
/// ascending. Re-applying the sort is a no-op (stable, date-keyed).
pub fn build_timeline(bundles: &HashMap<u64, NetworkBundle>) -> Vec<TimelineEntry> {
    let mut entries: Vec<TimelineEntry> = bundles
        .values()
        .flat_map(|b| b.incoming.iter().chain(b.outgoing.iter()))
        .filter_map(entry_from_transfer)
        .collect();
    entries.sort_by_key(|e| e.date);
    entries
}
