pub mod catalog;
pub mod client;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use catalog::{ChainlistDirectory, EndpointCatalog};
pub use client::ResilientClient;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use transport::HttpTransport;
