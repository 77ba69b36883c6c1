//! In-memory transport and directory used by the RPC, chain and snapshot tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::rpc::catalog::{EndpointCatalog, EndpointDirectory};
use crate::rpc::client::ResilientClient;
use crate::rpc::rate_limiter::RateLimiter;
use crate::rpc::retry::RetryPolicy;
use crate::rpc::transport::RpcTransport;

/// Transport whose responses come from a closure over `(endpoint, method, params)`.
/// Every call is recorded so tests can assert which endpoint served what.
pub struct ScriptedTransport<F> {
    handler: F,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl<F> ScriptedTransport<F>
where
    F: Fn(&str, &str, &Value) -> Result<Value> + Send + Sync,
{
    pub fn new(handler: F) -> Arc<Self> {
        Self::with_delays(handler, &[])
    }

    pub fn with_delays(handler: F, delays: &[(&str, Duration)]) -> Arc<Self> {
        Arc::new(Self {
            handler,
            delays: delays.iter().map(|(u, d)| (u.to_string(), *d)).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Endpoints that received `method`, in call order.
    pub fn calls_for(&self, method: &str) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(_, m)| m == method).map(|(u, _)| u.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<F> RpcTransport for ScriptedTransport<F>
where
    F: Fn(&str, &str, &Value) -> Result<Value> + Send + Sync,
{
    async fn request(&self, endpoint: &str, method: &str, params: Value) -> Result<Value> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((endpoint.to_string(), method.to_string()));
        }
        if let Some(delay) = self.delays.get(endpoint) {
            tokio::time::sleep(*delay).await;
        }
        (self.handler)(endpoint, method, &params)
    }
}

pub struct StaticDirectory(Vec<String>);

impl StaticDirectory {
    pub fn new(urls: &[&str]) -> Arc<Self> {
        Arc::new(Self(urls.iter().map(|u| u.to_string()).collect()))
    }
}

#[async_trait]
impl EndpointDirectory for StaticDirectory {
    async fn list(&self, _chain_id: u64) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

pub struct FailingDirectory;

#[async_trait]
impl EndpointDirectory for FailingDirectory {
    async fn list(&self, _chain_id: u64) -> Result<Vec<String>> {
        Err(RpcError::InvalidResponse("directory offline".to_string()).into())
    }
}

/// Millisecond-scale retry policy so failure paths run quickly.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        rate_limit_delay: Duration::from_millis(1),
        request_timeout: Duration::from_millis(500),
    }
}

/// Client over an initialized catalog ranked exactly in the order of `urls`.
/// Ranking reads go to a separate transport whose answers arrive 20ms apart
/// per position, so `transport` only sees the calls made through the client.
pub async fn test_client(urls: &[&str], transport: Arc<dyn RpcTransport>) -> ResilientClient {
    let delays: Vec<(&str, Duration)> = urls
        .iter()
        .enumerate()
        .map(|(i, u)| (*u, Duration::from_millis(20 * i as u64)))
        .collect();
    let ranking = ScriptedTransport::with_delays(|_, _, _| Ok(Value::from("0x1")), &delays);
    let catalog = EndpointCatalog::new(
        146,
        StaticDirectory::new(urls),
        ranking,
        Vec::new(),
        Duration::from_secs(2),
        Duration::from_secs(300),
    );
    catalog.initialize().await;
    ResilientClient::new(
        Arc::new(catalog),
        Arc::new(RateLimiter::new(Duration::from_secs(60), 10_000)),
        transport,
        fast_policy(),
    )
}
