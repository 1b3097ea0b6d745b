use eyre::eyre;
use serde::Serialize;

/// A supported blockchain network and where to find its transaction
/// indexing service. Immutable after registry construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: u64,
    pub name: &'static str,
    /// Base URL of the transaction indexing service for this network.
    pub tx_service: &'static str,
    /// Block explorer template; `{}` is replaced with a tx hash or address.
    pub explorer_tx: &'static str,
    pub explorer_address: &'static str,
    pub native_symbol: &'static str,
    /// Display color used by the visualization layer.
    pub color: &'static str,
}

impl Network {
    pub fn tx_url(&self, tx_hash: &str) -> String {
        self.explorer_tx.replace("{}", tx_hash)
    }

    pub fn address_url(&self, address: &str) -> String {
        self.explorer_address.replace("{}", address)
    }
}

/// Static table of networks the pipeline knows how to query.
///
/// Independently constructible so tests can run against a trimmed registry;
/// production code uses [`NetworkRegistry::builtin`].
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Vec<Network>,
}

impl NetworkRegistry {
    pub fn new(networks: Vec<Network>) -> Self {
        Self { networks }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Network {
                id: 1,
                name: "Ethereum",
                tx_service: "https://safe-transaction-mainnet.safe.global",
                explorer_tx: "https://etherscan.io/tx/{}",
                explorer_address: "https://etherscan.io/address/{}",
                native_symbol: "ETH",
                color: "#627eea",
            },
            Network {
                id: 10,
                name: "Optimism",
                tx_service: "https://safe-transaction-optimism.safe.global",
                explorer_tx: "https://optimistic.etherscan.io/tx/{}",
                explorer_address: "https://optimistic.etherscan.io/address/{}",
                native_symbol: "ETH",
                color: "#ff0420",
            },
            Network {
                id: 56,
                name: "BNB Chain",
                tx_service: "https://safe-transaction-bsc.safe.global",
                explorer_tx: "https://bscscan.com/tx/{}",
                explorer_address: "https://bscscan.com/address/{}",
                native_symbol: "BNB",
                color: "#f3ba2f",
            },
            Network {
                id: 100,
                name: "Gnosis Chain",
                tx_service: "https://safe-transaction-gnosis-chain.safe.global",
                explorer_tx: "https://gnosisscan.io/tx/{}",
                explorer_address: "https://gnosisscan.io/address/{}",
                native_symbol: "xDAI",
                color: "#3e6957",
            },
            Network {
                id: 137,
                name: "Polygon",
                tx_service: "https://safe-transaction-polygon.safe.global",
                explorer_tx: "https://polygonscan.com/tx/{}",
                explorer_address: "https://polygonscan.com/address/{}",
                native_symbol: "POL",
                color: "#8247e5",
            },
            Network {
                id: 8453,
                name: "Base",
                tx_service: "https://safe-transaction-base.safe.global",
                explorer_tx: "https://basescan.org/tx/{}",
                explorer_address: "https://basescan.org/address/{}",
                native_symbol: "ETH",
                color: "#0052ff",
            },
            Network {
                id: 42161,
                name: "Arbitrum One",
                tx_service: "https://safe-transaction-arbitrum.safe.global",
                explorer_tx: "https://arbiscan.io/tx/{}",
                explorer_address: "https://arbiscan.io/address/{}",
                native_symbol: "ETH",
                color: "#28a0f0",
            },
            Network {
                id: 43114,
                name: "Avalanche",
                tx_service: "https://safe-transaction-avalanche.safe.global",
                explorer_tx: "https://snowtrace.io/tx/{}",
                explorer_address: "https://snowtrace.io/address/{}",
                native_symbol: "AVAX",
                color: "#e84142",
            },
        ])
    }

    pub fn all(&self) -> &[Network] {
        &self.networks
    }

    /// Lookup by chain id. An unknown id is a programming error on the
    /// caller's side, not a runtime condition, so this is a hard error.
    pub fn get(&self, id: u64) -> eyre::Result<&Network> {
        self.networks
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| eyre!("unsupported network id {}", id))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
