pub mod client;
pub mod limiter;
pub mod pool;
pub mod transport;

pub use client::{ResilientFetcher, RetryPolicy};
pub use limiter::RateLimiter;
pub use pool::run_bounded;
pub use transport::{HttpTransport, RawResponse, Transport};
