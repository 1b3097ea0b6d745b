use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Token-bucket refill rate shared across every call to the upstream
    /// indexing services (they meter per client, not per network).
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Width of the bounded pool used when fetching bundles for several
    /// networks at once.
    #[serde(default = "default_max_concurrent_networks")]
    pub max_concurrent_networks: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
            max_concurrent_networks: default_max_concurrent_networks(),
        }
    }
}

fn default_max_retries() -> u32 {
    4
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rate_per_sec() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_max_concurrent_networks() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Hard cap on accumulated history records per network, bounding memory
    /// and latency for very active accounts.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_records: default_max_records(),
            page_delay_ms: default_page_delay_ms(),
            probe_delay_ms: default_probe_delay_ms(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_max_records() -> usize {
    1000
}

fn default_page_delay_ms() -> u64 {
    250
}

fn default_probe_delay_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.history.page_size == 0 {
            return Err(eyre::eyre!("history.page_size must be positive"));
        }
        if self.history.max_records < self.history.page_size as usize {
            return Err(eyre::eyre!(
                "history.max_records ({}) must be at least one page ({})",
                self.history.max_records,
                self.history.page_size
            ));
        }
        if self.fetcher.rate_per_sec <= 0.0 {
            return Err(eyre::eyre!("fetcher.rate_per_sec must be positive"));
        }
        if self.fetcher.burst == 0 {
            return Err(eyre::eyre!("fetcher.burst must be positive"));
        }
        if self.fetcher.max_concurrent_networks == 0 {
            return Err(eyre::eyre!(
                "fetcher.max_concurrent_networks must be positive"
            ));
        }
        Ok(())
    }
}
