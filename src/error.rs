use thiserror::Error;

/// Errors surfaced by the resilient fetcher.
///
/// Absence of a resource (HTTP 404) is not an error: the fetcher returns
/// `Ok(None)` for it, because a missing account on a network is the expected
/// common case during discovery.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Rate-limit retry budget consumed without a successful response.
    #[error("rate limit budget exhausted after {attempts} attempts: {url}")]
    RateLimitExhausted { attempts: u32, url: String },

    /// Non-success, non-rate-limit HTTP status.
    #[error("service returned status {status} for {url}")]
    Service { status: u16, url: String },

    /// Transport-level failure (DNS, connect, timeout, broken body).
    #[error("network error: {0}")]
    Network(String),

    /// Body was not valid JSON for the expected shape.
    #[error("malformed response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Whether a caller that tolerates partial data may degrade this error
    /// to an absent result instead of aborting the whole account.
    pub fn is_degradable(&self) -> bool {
        matches!(self, FetchError::RateLimitExhausted { .. })
    }
}
