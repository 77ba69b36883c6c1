use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256, U64};
use alloy_rpc_types_eth::{Filter, Log, TransactionInput, TransactionRequest};
use alloy_sol_types::SolCall;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::abi::{IMulticall3, IVotingEscrow};
use crate::error::{AppError, Result, RpcError};
use crate::rpc::catalog::EndpointCatalog;
use crate::rpc::rate_limiter::RateLimiter;
use crate::rpc::retry::{classify, FailureKind, RetryPolicy};
use crate::rpc::transport::RpcTransport;

/// Executes chain calls against the catalog's active endpoint with rate
/// limiting, retry and failover. It is the only component that moves the
/// catalog's active endpoint.
pub struct ResilientClient {
    catalog: Arc<EndpointCatalog>,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn RpcTransport>,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(
        catalog: Arc<EndpointCatalog>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn RpcTransport>,
        policy: RetryPolicy,
    ) -> Self {
        Self { catalog, limiter, transport, policy }
    }

    pub fn catalog(&self) -> &Arc<EndpointCatalog> {
        &self.catalog
    }

    pub async fn current_endpoint(&self) -> String {
        self.catalog.current().await
    }

    /// Run one JSON-RPC call under the retry policy.
    ///
    /// Rate-limited attempts rotate without penalizing the endpoint and wait a
    /// fixed delay. A request the node rejects on its own merits (oversized
    /// range, revert) is returned at once and leaves the endpoint alone. Any
    /// other failure removes the endpoint from the catalog and backs off
    /// exponentially. Each failed attempt swaps the endpoint at most once.
    pub async fn execute(&self, method: &str, params: Value) -> Result<Value> {
        let mut endpoint = self.catalog.current().await;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.check_limit().await;

            let err = match self.dispatch(&endpoint, method, params.clone()).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(endpoint = %endpoint, method, attempt, "[RPC] call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let kind = classify(&err);
            warn!(
                endpoint = %endpoint,
                method,
                attempt,
                max_attempts = self.policy.max_attempts,
                kind = %kind,
                "[RPC] call failed: {err}"
            );

            let failed = std::mem::take(&mut endpoint);
            endpoint = match kind {
                FailureKind::Rejected => return Err(err),
                FailureKind::RateLimited => self.catalog.advance_from(&failed).await,
                FailureKind::Hard => match self.catalog.mark_failed(&failed).await {
                    Ok(next) => next,
                    Err(exhausted) => {
                        error!(endpoint = %failed, method, "[RPC] no endpoints left, last error: {err}");
                        return Err(exhausted);
                    }
                },
            };

            if !self.policy.should_retry(attempt) {
                return Err(AppError::RetriesExhausted {
                    attempts: attempt,
                    endpoint: failed,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(attempt, kind);
            debug!(next = %endpoint, delay_ms = delay.as_millis() as u64, "[RPC] retrying");
            sleep(delay).await;
        }
    }

    async fn dispatch(&self, endpoint: &str, method: &str, params: Value) -> Result<Value> {
        match timeout(self.policy.request_timeout, self.transport.request(endpoint, method, params)).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: self.policy.request_timeout.as_millis() as u64,
            }
            .into()),
        }
    }

    // -----------------------------------------------------------------------
    // Typed operations
    // -----------------------------------------------------------------------

    pub async fn block_number(&self) -> Result<u64> {
        let n: U64 = self.execute_typed("eth_blockNumber", json!([])).await?;
        Ok(n.to::<u64>())
    }

    /// `eth_call` against the latest block.
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(TransactionInput::both(Bytes::from(data)));
        self.execute_typed("eth_call", json!([tx, "latest"])).await
    }

    /// Multicall3 `aggregate3`. Per-call results keep the order of `calls`.
    pub async fn aggregate(
        &self,
        multicall: Address,
        calls: Vec<IMulticall3::Call3>,
    ) -> Result<Vec<IMulticall3::Result>> {
        let expected = calls.len();
        let data = IMulticall3::aggregate3Call { calls }.abi_encode();
        let raw = self.call(multicall, data).await?;
        let results = IMulticall3::aggregate3Call::abi_decode_returns(&raw)?;
        if results.len() != expected {
            return Err(RpcError::InvalidResponse(format!(
                "multicall returned {} results for {expected} calls",
                results.len()
            ))
            .into());
        }
        Ok(results)
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.execute_typed("eth_getLogs", json!([filter])).await
    }

    pub async fn total_supply(&self, contract: Address) -> Result<U256> {
        let data = IVotingEscrow::totalSupplyCall {}.abi_encode();
        let raw = self.call(contract, data).await?;
        Ok(IVotingEscrow::totalSupplyCall::abi_decode_returns(&raw)?)
    }

    async fn execute_typed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let v = self.execute(method, params).await?;
        serde_json::from_value(v)
            .map_err(|e| RpcError::InvalidResponse(format!("{method} result did not decode: {e}")).into())
    }
}
