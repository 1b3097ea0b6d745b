use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::FetchError;
use crate::fetch::limiter::RateLimiter;
use crate::fetch::transport::Transport;

/// Retry behavior for rate-limited responses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt`, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(2u32.saturating_pow(attempt));
        std::cmp::min(exp, self.max_backoff)
    }
}

/// HTTP GET with absence handling and rate-limit backoff.
///
/// Status interpretation:
/// - 404 is a valid result: the resource simply does not exist (`Ok(None)`).
/// - 429 backs off exponentially and retries within a bounded budget.
/// - Any other non-2xx status fails immediately with [`FetchError::Service`].
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    /// Fetch and decode a JSON resource. `Ok(None)` means the resource does
    /// not exist upstream.
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, FetchError> {
        let attempts = self.policy.max_retries + 1;
        for attempt in 0..attempts {
            self.limiter.acquire().await;
            let response = self.transport.get(url).await?;

            match response.status {
                404 => return Ok(None),
                429 => {
                    // No point sleeping after the last permitted attempt.
                    if attempt + 1 < attempts {
                        let delay = self.policy.backoff(attempt);
                        tracing::warn!(
                            url,
                            attempt = attempt + 1,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                status if (200..300).contains(&status) => {
                    return serde_json::from_str(&response.body)
                        .map(Some)
                        .map_err(|source| FetchError::Decode {
                            url: url.to_string(),
                            source,
                        });
                }
                status => {
                    return Err(FetchError::Service {
                        status,
                        url: url.to_string(),
                    });
                }
            }
        }

        Err(FetchError::RateLimitExhausted {
            attempts,
            url: url.to_string(),
        })
    }

    /// Like [`get`](Self::get), but degrades an exhausted retry budget to
    /// absence. Used where partial data beats aborting a whole account:
    /// discovery probes and mid-pagination page fetches.
    pub async fn get_degraded<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, FetchError> {
        match self.get(url).await {
            Err(e) if e.is_degradable() => {
                tracing::warn!(url, error = %e, "Degrading exhausted fetch to absent");
                Ok(None)
            }
            other => other,
        }
    }
}
