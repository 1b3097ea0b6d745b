//! Serde model of the transaction indexing service's wire format.
//!
//! Only the fields the pipeline consumes are modeled; everything else in the
//! upstream payload is ignored by serde. The normalizer is the only consumer
//! allowed to interpret transaction internals.

use serde::{Deserialize, Serialize};

use crate::networks::Network;

/// On-chain configuration of a multisig account on one network.
/// The only upstream type that crosses the pipeline boundary unchanged,
/// so it serializes back out for API consumers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub address: String,
    pub nonce: u64,
    pub threshold: u32,
    pub owners: Vec<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    pub fallback_handler: Option<String>,
    pub guard: Option<String>,
    pub version: Option<String>,
}

/// One asset balance row. `token_address` is null for the native asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBalance {
    pub token_address: Option<String>,
    pub token: Option<TokenInfo>,
    pub balance: String,
    pub fiat_balance: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
}

/// One page of the unified transaction history endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub count: Option<u64>,
    /// Continuation cursor: a fully-formed URL for the next page, or null.
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<RawTransaction>,
}

/// Opaque transaction representation from the indexing service.
///
/// Kept as close to the wire as serde allows; shape reconciliation happens
/// exclusively in the normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub tx_type: Option<String>,
    pub safe: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub execution_date: Option<String>,
    pub is_executed: Option<bool>,
    pub tx_hash: Option<String>,
    pub transaction_hash: Option<String>,
    pub data_decoded: Option<DecodedCall>,
    /// Enriched per-asset transfer records, when the service supplies them.
    /// Preferred over `data_decoded` because they carry exact decimals.
    #[serde(default)]
    pub transfers: Vec<RawTransfer>,
}

/// Decoded contract call: method name plus named parameters, nested for
/// batch calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedCall {
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<DecodedParam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
    /// For `multiSend` this is an array of [`InnerCall`]; left loose here and
    /// decoded strictly at the use site so one odd parameter cannot reject a
    /// whole page of transactions.
    #[serde(default)]
    pub value_decoded: Option<serde_json::Value>,
}

/// One inner operation of a batched transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerCall {
    pub to: Option<String>,
    pub value: Option<String>,
    pub data: Option<String>,
    pub data_decoded: Option<DecodedCall>,
}

/// Enriched transfer sub-record attached to a transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransfer {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub execution_date: Option<String>,
    pub transaction_hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub token_address: Option<String>,
    pub token_info: Option<TokenInfo>,
}

pub fn account_info_url(network: &Network, address: &str) -> String {
    format!("{}/api/v1/safes/{}/", network.tx_service, address)
}

pub fn balances_url(network: &Network, address: &str) -> String {
    format!(
        "{}/api/v1/safes/{}/balances/?trusted=true&exclude_spam=true",
        network.tx_service, address
    )
}

pub fn history_url(network: &Network, address: &str, page_size: u32) -> String {
    format!(
        "{}/api/v1/safes/{}/all-transactions/?limit={}&executed=true&queued=false&trusted=true",
        network.tx_service, address, page_size
    )
}
