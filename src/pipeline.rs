use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::Config;
use crate::fetch::{run_bounded, HttpTransport, RateLimiter, ResilientFetcher, RetryPolicy, Transport};
use crate::networks::{Network, NetworkRegistry};
use crate::normalize::{self, Balance, Transfer};
use crate::upstream::{self, AccountInfo, HistoryPage, RawBalance, RawTransaction};

/// An account found on one network during discovery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAccount {
    pub network_id: u64,
    pub network: Network,
    pub info: AccountInfo,
}

/// Everything fetched and normalized for one (account, network) pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBundle {
    pub network_id: u64,
    pub info: AccountInfo,
    pub balances: Vec<Balance>,
    pub incoming: Vec<Transfer>,
    pub outgoing: Vec<Transfer>,
}

/// Orchestrates the fetch-normalize half of the pipeline:
/// discovery -> per-network chain data -> canonical transfers.
///
/// Explicitly constructed and passed by reference; no process-wide state.
/// Tests run it over a scripted transport.
pub struct AccountPipeline {
    registry: NetworkRegistry,
    fetcher: ResilientFetcher,
    probe_delay: Duration,
    page_delay: Duration,
    page_size: u32,
    max_records: usize,
    pool_width: usize,
}

impl AccountPipeline {
    pub fn new(config: &Config) -> eyre::Result<Self> {
        let transport = Arc::new(HttpTransport::new(Duration::from_secs(
            config.fetcher.timeout_secs,
        ))?);
        Ok(Self::with_transport(
            transport,
            NetworkRegistry::builtin(),
            config,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        registry: NetworkRegistry,
        config: &Config,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.fetcher.rate_per_sec,
            config.fetcher.burst,
        ));
        let fetcher = ResilientFetcher::new(
            transport,
            limiter,
            RetryPolicy {
                max_retries: config.fetcher.max_retries,
                base_backoff: Duration::from_millis(config.fetcher.base_backoff_ms),
                max_backoff: Duration::from_millis(config.fetcher.max_backoff_ms),
            },
        );
        Self {
            registry,
            fetcher,
            probe_delay: Duration::from_millis(config.history.probe_delay_ms),
            page_delay: Duration::from_millis(config.history.page_delay_ms),
            page_size: config.history.page_size,
            max_records: config.history.max_records,
            pool_width: config.fetcher.max_concurrent_networks,
        }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Probe every registered network for the account, sequentially with a
    /// fixed inter-probe delay. Absence and probe failures are both
    /// non-events: the network is simply not in the result.
    pub async fn discover_accounts(&self, address: &str) -> Vec<DiscoveredAccount> {
        let mut found = Vec::new();
        for (i, network) in self.registry.all().iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.probe_delay).await;
            }
            let url = upstream::account_info_url(network, address);
            match self.fetcher.get_degraded::<AccountInfo>(&url).await {
                Ok(Some(info)) => {
                    tracing::info!(network = %network.name, address, "Account present");
                    found.push(DiscoveredAccount {
                        network_id: network.id,
                        network: network.clone(),
                        info,
                    });
                }
                Ok(None) => {
                    tracing::debug!(network = %network.name, address, "Account not present");
                }
                Err(e) => {
                    tracing::debug!(network = %network.name, error = %e, "Probe failed, skipping");
                }
            }
        }
        found
    }

    /// Fetch configuration, balances and executed history for one network
    /// and normalize everything into a [`NetworkBundle`].
    pub async fn fetch_network_bundle(
        &self,
        address: &str,
        network_id: u64,
    ) -> eyre::Result<NetworkBundle> {
        let network = self.registry.get(network_id)?;

        let info_url = upstream::account_info_url(network, address);
        let info: AccountInfo = self
            .fetcher
            .get(&info_url)
            .await?
            .ok_or_else(|| eyre::eyre!("account {} not found on {}", address, network.name))?;

        let raw_balances: Vec<RawBalance> = self
            .fetcher
            .get_degraded(&upstream::balances_url(network, address))
            .await?
            .unwrap_or_default();

        let history = self.fetch_history(network, address).await;
        tracing::info!(
            network = %network.name,
            address,
            records = history.len(),
            "Fetched transaction history"
        );

        let (incoming, outgoing) = partition_and_normalize(&history, address, network);

        Ok(NetworkBundle {
            network_id,
            info,
            balances: normalize::normalize_balances(&raw_balances, network),
            incoming,
            outgoing,
        })
    }

    /// Page through the unified history endpoint following the `next`
    /// cursor, accumulating at most `max_records` records. Mid-stream
    /// failures truncate the history rather than discarding fetched pages.
    async fn fetch_history(&self, network: &Network, address: &str) -> Vec<RawTransaction> {
        let mut url = upstream::history_url(network, address, self.page_size);
        let mut records: Vec<RawTransaction> = Vec::new();
        let mut first = true;

        loop {
            if !first {
                tokio::time::sleep(self.page_delay).await;
            }
            first = false;

            let page = match self.fetcher.get_degraded::<HistoryPage>(&url).await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        network = %network.name,
                        error = %e,
                        fetched = records.len(),
                        "History page fetch failed, truncating"
                    );
                    break;
                }
            };

            // An empty page makes no progress toward the cap; following its
            // cursor would loop forever.
            if page.results.is_empty() {
                if page.next.is_some() {
                    tracing::warn!(
                        network = %network.name,
                        fetched = records.len(),
                        "Empty history page with a continuation cursor, stopping"
                    );
                }
                break;
            }

            records.extend(page.results);
            if records.len() >= self.max_records {
                records.truncate(self.max_records);
                tracing::debug!(
                    network = %network.name,
                    cap = self.max_records,
                    "History record cap reached"
                );
                break;
            }

            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        records
    }

    /// Fetch bundles for every discovered network through the bounded pool.
    /// A network that fails is logged and excluded; it never aborts the
    /// others.
    pub async fn fetch_all_bundles(
        &self,
        address: &str,
        discovered: &[DiscoveredAccount],
    ) -> HashMap<u64, NetworkBundle> {
        let tasks: Vec<_> = discovered
            .iter()
            .map(|d| {
                let network_id = d.network_id;
                async move {
                    (
                        network_id,
                        self.fetch_network_bundle(address, network_id).await,
                    )
                }
            })
            .collect();

        let results = run_bounded(tasks, self.pool_width).await;

        let mut bundles = HashMap::new();
        for (network_id, result) in results {
            match result {
                Ok(bundle) => {
                    bundles.insert(network_id, bundle);
                }
                Err(e) => {
                    tracing::warn!(
                        network_id,
                        error = %e,
                        "Failed to fetch network bundle, excluding network"
                    );
                }
            }
        }
        bundles
    }
}

/// Partition raw history into the two candidate sets and normalize each:
/// executed multisig transactions feed the outgoing side; enriched transfer
/// sub-records on any transaction feed the incoming side.
fn partition_and_normalize(
    history: &[RawTransaction],
    address: &str,
    network: &Network,
) -> (Vec<Transfer>, Vec<Transfer>) {
    let mut incoming = Vec::new();
    let mut outgoing = Vec::new();

    for tx in history {
        if tx.tx_type.as_deref() == Some("MULTISIG_TRANSACTION") && tx.is_executed.unwrap_or(true)
        {
            outgoing.extend(normalize::normalize_transaction(tx, address, network));
        }

        for raw in &tx.transfers {
            if let Some(t) =
                normalize::normalize_enriched(raw, tx.execution_date.as_deref(), address, network)
            {
                if t.direction == normalize::Direction::In {
                    incoming.push(t);
                }
            }
        }
    }

    (incoming, outgoing)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::transport::RawResponse;
    use async_trait::async_trait;

    const ACCOUNT: &str = "0xAAA0000000000000000000000000000000000001";
    const OTHER: &str = "0xBBB0000000000000000000000000000000000002";

    /// Stateless URL-pattern router: first matching rule answers, repeatedly.
    /// Unmatched URLs are 404, like an indexing service that has never heard
    /// of the account.
    struct RouterTransport {
        routes: Vec<(String, RawResponse)>,
    }

    impl RouterTransport {
        fn new(routes: Vec<(&str, serde_json::Value)>) -> Self {
            Self {
                routes: routes
                    .into_iter()
                    .map(|(pattern, body)| {
                        (
                            pattern.to_string(),
                            RawResponse {
                                status: 200,
                                body: body.to_string(),
                            },
                        )
                    })
                    .collect(),
            }
        }

        fn with_status(mut self, pattern: &str, status: u16) -> Self {
            self.routes.insert(
                0,
                (
                    pattern.to_string(),
                    RawResponse {
                        status,
                        body: String::new(),
                    },
                ),
            );
            self
        }
    }

    #[async_trait]
    impl crate::fetch::Transport for RouterTransport {
        async fn get(&self, url: &str) -> Result<RawResponse, FetchError> {
            for (pattern, response) in &self.routes {
                if url.contains(pattern) {
                    return Ok(response.clone());
                }
            }
            Ok(RawResponse {
                status: 404,
                body: String::new(),
            })
        }
    }

    fn pipeline(transport: RouterTransport) -> AccountPipeline {
        AccountPipeline::with_transport(
            Arc::new(transport),
            NetworkRegistry::builtin(),
            &Config::default(),
        )
    }

    fn info_body() -> serde_json::Value {
        serde_json::json!({
            "address": ACCOUNT,
            "nonce": 5,
            "threshold": 2,
            "owners": ["0x1", "0x2", "0x3"],
            "modules": [],
            "fallbackHandler": null,
            "guard": null,
            "version": "1.3.0"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_excludes_absent_networks() {
        let transport = RouterTransport::new(vec![
            ("safe-transaction-mainnet", info_body()),
            ("safe-transaction-polygon", info_body()),
        ]);
        let pipeline = pipeline(transport);

        let discovered = pipeline.discover_accounts(ACCOUNT).await;
        let ids: Vec<u64> = discovered.iter().map(|d| d.network_id).collect();
        assert_eq!(ids, vec![1, 137]);
        assert_eq!(discovered[0].info.threshold, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_skips_erroring_network() {
        let transport = RouterTransport::new(vec![("safe-transaction-mainnet", info_body())])
            .with_status("safe-transaction-polygon", 500);
        let pipeline = pipeline(transport);

        let ids: Vec<u64> = pipeline
            .discover_accounts(ACCOUNT)
            .await
            .iter()
            .map(|d| d.network_id)
            .collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_at_record_cap() {
        // A service that advertises a next page forever.
        let results: Vec<serde_json::Value> = (0..100)
            .map(|_| {
                serde_json::json!({
                    "txType": "ETHEREUM_TRANSACTION",
                    "executionDate": "2024-01-01T00:00:00Z",
                    "to": ACCOUNT,
                    "transfers": [{
                        "type": "ETHER_TRANSFER",
                        "from": OTHER,
                        "to": ACCOUNT,
                        "value": "1000000000000000000"
                    }]
                })
            })
            .collect();
        // Specific patterns first: the catch-all info route would otherwise
        // shadow the history and balances URLs.
        let transport = RouterTransport::new(vec![
            (
                "all-transactions",
                serde_json::json!({
                    "count": 999_999,
                    "next": "https://safe-transaction-mainnet.safe.global/api/v1/safes/0xA/all-transactions/?offset=100",
                    "results": results
                }),
            ),
            ("balances", serde_json::json!([])),
            ("/safes/", info_body()),
        ]);
        let pipeline = pipeline(transport);

        let bundle = pipeline.fetch_network_bundle(ACCOUNT, 1).await.unwrap();
        // Default cap is 1000; the service would have paged forever.
        assert_eq!(bundle.incoming.len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_on_empty_page_with_cursor() {
        // Degenerate service: zero results but a continuation cursor, forever.
        let transport = RouterTransport::new(vec![
            (
                "all-transactions",
                serde_json::json!({
                    "count": 0,
                    "next": "https://safe-transaction-mainnet.safe.global/api/v1/safes/0xA/all-transactions/?offset=100",
                    "results": []
                }),
            ),
            ("balances", serde_json::json!([])),
            ("/safes/", info_body()),
        ]);
        let pipeline = pipeline(transport);

        let bundle = pipeline.fetch_network_bundle(ACCOUNT, 1).await.unwrap();
        assert!(bundle.incoming.is_empty());
        assert!(bundle.outgoing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundle_partitions_and_normalizes() {
        let history = serde_json::json!({
            "count": 2,
            "next": null,
            "results": [
                {
                    "txType": "MULTISIG_TRANSACTION",
                    "safe": ACCOUNT,
                    "to": OTHER,
                    "value": "2000000000000000000",
                    "executionDate": "2024-02-01T00:00:00Z",
                    "isExecuted": true
                },
                {
                    "txType": "ETHEREUM_TRANSACTION",
                    "executionDate": "2024-01-15T00:00:00Z",
                    "to": ACCOUNT,
                    "transfers": [{
                        "type": "ERC20_TRANSFER",
                        "from": OTHER,
                        "to": ACCOUNT,
                        "value": "250000000",
                        "tokenAddress": "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                        "tokenInfo": {"symbol": "USDC", "decimals": 6}
                    }]
                }
            ]
        });
        let balances = serde_json::json!([
            {"tokenAddress": null, "token": null, "balance": "1000000000000000000", "fiatBalance": "2500.0"}
        ]);
        let transport = RouterTransport::new(vec![
            ("all-transactions", history),
            ("balances", balances),
            ("/safes/", info_body()),
        ]);
        let pipeline = pipeline(transport);

        let bundle = pipeline.fetch_network_bundle(ACCOUNT, 1).await.unwrap();
        assert_eq!(bundle.outgoing.len(), 1);
        assert_eq!(bundle.outgoing[0].token, "ETH");
        assert_eq!(bundle.outgoing[0].amount, 2.0);
        assert_eq!(bundle.incoming.len(), 1);
        assert_eq!(bundle.incoming[0].token, "USDC");
        assert_eq!(bundle.incoming[0].amount, 250.0);
        assert_eq!(bundle.balances.len(), 1);
        assert_eq!(bundle.balances[0].amount, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_bundles_excludes_failing_network() {
        let transport = RouterTransport::new(vec![
            (
                "all-transactions",
                serde_json::json!({"count": 0, "next": null, "results": []}),
            ),
            ("balances", serde_json::json!([])),
            ("safe-transaction-mainnet", info_body()),
        ])
        .with_status("safe-transaction-polygon", 500);
        // Polygon's info probe succeeded earlier, so it appears discovered.
        let pipeline = pipeline(transport);

        let registry = NetworkRegistry::builtin();
        let discovered = vec![
            DiscoveredAccount {
                network_id: 1,
                network: registry.get(1).unwrap().clone(),
                info: testing::account_info(ACCOUNT),
            },
            DiscoveredAccount {
                network_id: 137,
                network: registry.get(137).unwrap().clone(),
                info: testing::account_info(ACCOUNT),
            },
        ];

        let bundles = pipeline.fetch_all_bundles(ACCOUNT, &discovered).await;
        assert!(bundles.contains_key(&1));
        assert!(!bundles.contains_key(&137));
    }
}
