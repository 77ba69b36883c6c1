use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use alloy_primitives::U64;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result, RpcError};
use crate::rpc::transport::RpcTransport;

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Source of candidate RPC URLs for a chain.
#[async_trait]
pub trait EndpointDirectory: Send + Sync {
    async fn list(&self, chain_id: u64) -> Result<Vec<String>>;
}

/// Reads the public chainlist `rpcs.json` document.
pub struct ChainlistDirectory {
    client: reqwest::Client,
    url: String,
}

impl ChainlistDirectory {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl EndpointDirectory for ChainlistDirectory {
    async fn list(&self, chain_id: u64) -> Result<Vec<String>> {
        let resp = self.client.get(&self.url).send().await?.error_for_status()?;
        let doc: Value = resp.json().await?;
        extract_chain_rpcs(&doc, chain_id)
    }
}

/// Pull the usable HTTPS URLs for `chain_id` out of a chainlist document.
/// Entries are either bare strings or objects with a `url` field; URLs that
/// still carry `${API_KEY}`-style placeholders are dropped.
pub fn extract_chain_rpcs(doc: &Value, chain_id: u64) -> Result<Vec<String>> {
    let chains = doc
        .as_array()
        .ok_or_else(|| RpcError::InvalidResponse("chainlist document was not an array".to_string()))?;

    let chain = chains
        .iter()
        .find(|c| c.get("chainId").and_then(|id| id.as_u64()) == Some(chain_id))
        .ok_or_else(|| RpcError::InvalidResponse(format!("chain {chain_id} not found in chainlist")))?;

    let mut urls: Vec<String> = Vec::new();
    for entry in chain.get("rpc").and_then(|r| r.as_array()).into_iter().flatten() {
        let url = entry
            .as_str()
            .or_else(|| entry.get("url").and_then(|u| u.as_str()));
        let Some(url) = url else { continue };
        if !url.starts_with("https://") || url.contains('$') {
            continue;
        }
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    Ok(urls)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A candidate endpoint. `latency` is None when the list could not be ranked
/// (no endpoint answered the probe) and directory order is kept instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: String,
    pub latency: Option<Duration>,
}

struct CatalogState {
    ranked: Vec<Endpoint>,
    index: usize,
    last_refresh: Instant,
}

impl CatalogState {
    fn current(&self) -> Option<&str> {
        self.ranked.get(self.index).map(|e| e.url.as_str())
    }
}

/// Prioritized, mutable list of RPC endpoints for one chain.
///
/// Endpoints marked failed stay excluded for the rest of the run, including
/// across refreshes; [`EndpointCatalog::reset`] starts a new run.
pub struct EndpointCatalog {
    chain_id: u64,
    directory: Arc<dyn EndpointDirectory>,
    transport: Arc<dyn RpcTransport>,
    fallbacks: Vec<String>,
    probe_timeout: Duration,
    refresh_interval: Duration,
    failed: DashSet<String>,
    state: Mutex<CatalogState>,
}

impl EndpointCatalog {
    pub fn new(
        chain_id: u64,
        directory: Arc<dyn EndpointDirectory>,
        transport: Arc<dyn RpcTransport>,
        fallbacks: Vec<String>,
        probe_timeout: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            chain_id,
            directory,
            transport,
            fallbacks,
            probe_timeout,
            refresh_interval,
            failed: DashSet::new(),
            state: Mutex::new(CatalogState {
                ranked: Vec::new(),
                index: 0,
                last_refresh: Instant::now(),
            }),
        }
    }

    pub fn from_config(
        cfg: &Config,
        directory: Arc<dyn EndpointDirectory>,
        transport: Arc<dyn RpcTransport>,
    ) -> Self {
        Self::new(
            cfg.chain_id,
            directory,
            transport,
            cfg.fallback_rpcs.clone(),
            cfg.probe_timeout,
            cfg.catalog_refresh,
        )
    }

    /// Populate and rank the catalog. Call once before first use.
    pub async fn initialize(&self) {
        let mut st = self.state.lock().await;
        self.reload(&mut st).await;
    }

    /// Forget failures from a previous run and re-rank from scratch.
    pub async fn reset(&self) {
        self.failed.clear();
        self.initialize().await;
    }

    /// Candidate URLs from the directory plus the fallback list, minus failed endpoints.
    pub async fn refresh(&self) -> Vec<String> {
        let mut urls = match self.directory.list(self.chain_id).await {
            Ok(list) => {
                info!(chain_id = self.chain_id, count = list.len(), "[CATALOG] fetched {} RPCs from directory", list.len());
                list
            }
            Err(e) => {
                warn!(chain_id = self.chain_id, "[CATALOG] directory unavailable, using fallback list: {e}");
                Vec::new()
            }
        };
        for fb in &self.fallbacks {
            if !urls.contains(fb) {
                urls.push(fb.clone());
            }
        }
        urls.retain(|u| !self.failed.contains(u));
        urls
    }

    /// Probe every candidate and keep the responders, fastest first.
    /// When nothing answers, the candidates are kept unranked in their given order.
    pub async fn rank(&self, candidates: Vec<String>) -> Vec<Endpoint> {
        debug!(count = candidates.len(), "[CATALOG] probing candidates");

        let probes = candidates.iter().map(|url| self.probe(url));
        let results = join_all(probes).await;

        let mut working: Vec<Endpoint> = candidates
            .iter()
            .zip(results)
            .filter_map(|(url, latency)| {
                latency.map(|l| Endpoint { url: url.clone(), latency: Some(l) })
            })
            .collect();

        if working.is_empty() {
            warn!(count = candidates.len(), "[CATALOG] no endpoint answered the probe, keeping unranked list");
            return candidates
                .into_iter()
                .map(|url| Endpoint { url, latency: None })
                .collect();
        }

        // Millisecond resolution; stable sort keeps directory order on ties.
        working.sort_by_key(|e| e.latency.map(|l| l.as_millis()));
        if let Some(best) = working.first() {
            info!(
                working = working.len(),
                candidates = candidates.len(),
                fastest = %best.url,
                latency_ms = best.latency.unwrap_or_default().as_millis() as u64,
                "[CATALOG] ranked {} working RPCs",
                working.len(),
            );
        }
        working
    }

    /// Best-ranked endpoint, or the first fallback when the catalog is empty.
    pub async fn current(&self) -> String {
        let st = self.state.lock().await;
        self.current_locked(&st)
    }

    /// Advance to the next endpoint in rank order, refreshing first when stale.
    pub async fn next(&self) -> String {
        let mut st = self.state.lock().await;
        let from = self.current_locked(&st);
        self.rotate_locked(&mut st, &from).await
    }

    /// Rotate away from `url` only if it is still the active endpoint.
    /// Concurrent callers that saw the same failure therefore rotate once.
    pub async fn advance_from(&self, url: &str) -> String {
        let mut st = self.state.lock().await;
        if st.current() != Some(url) {
            return self.current_locked(&st);
        }
        self.rotate_locked(&mut st, url).await
    }

    /// Drop `url` from the catalog for the rest of the run and return its replacement.
    /// Errors with `EndpointsExhausted` when no endpoint is left even after a refresh.
    pub async fn mark_failed(&self, url: &str) -> Result<String> {
        self.failed.insert(url.to_string());

        let mut st = self.state.lock().await;
        let before = st.ranked.len();
        st.ranked.retain(|e| e.url != url);

        if st.ranked.len() == before {
            // Already removed by a concurrent caller; no second swap.
            return if st.ranked.is_empty() {
                Err(AppError::Rpc(RpcError::EndpointsExhausted))
            } else {
                Ok(self.current_locked(&st))
            };
        }

        st.index = 0;
        warn!(endpoint = %url, remaining = st.ranked.len(), "[CATALOG] endpoint marked failed");

        if st.ranked.is_empty() {
            warn!("[CATALOG] all RPCs failed, reinitializing");
            self.reload(&mut st).await;
            if st.ranked.is_empty() {
                return Err(AppError::Rpc(RpcError::EndpointsExhausted));
            }
        }

        Ok(self.current_locked(&st))
    }

    /// Ranked endpoints in order, for logging.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.state.lock().await.ranked.clone()
    }

    fn current_locked(&self, st: &CatalogState) -> String {
        st.current()
            .map(str::to_string)
            .or_else(|| self.fallbacks.first().cloned())
            .unwrap_or_default()
    }

    async fn rotate_locked(&self, st: &mut CatalogState, from: &str) -> String {
        if st.last_refresh.elapsed() >= self.refresh_interval {
            debug!("[CATALOG] catalog stale, refreshing before rotation");
            self.reload(st).await;
            // The refresh resets to the head; step past `from` if it is back on top.
            if st.ranked.len() > 1 && st.current() == Some(from) {
                st.index = 1;
            }
        } else if !st.ranked.is_empty() {
            st.index = (st.index + 1) % st.ranked.len();
        }
        let to = self.current_locked(st);
        debug!(from = %from, to = %to, "[CATALOG] rotated endpoint");
        to
    }

    async fn reload(&self, st: &mut CatalogState) {
        let candidates = self.refresh().await;
        st.ranked = self.rank(candidates).await;
        st.index = 0;
        st.last_refresh = Instant::now();
    }

    /// Round-trip time of an `eth_blockNumber` call, or None if it failed or timed out.
    async fn probe(&self, url: &str) -> Option<Duration> {
        let started = Instant::now();
        let call = self.transport.request(url, "eth_blockNumber", json!([]));
        match timeout(self.probe_timeout, call).await {
            Ok(Ok(v)) => match serde_json::from_value::<U64>(v) {
                Ok(_) => Some(started.elapsed()),
                Err(e) => {
                    debug!(endpoint = %url, "[CATALOG] probe returned no block number: {e}");
                    None
                }
            },
            Ok(Err(e)) => {
                debug!(endpoint = %url, "[CATALOG] probe failed: {e}");
                None
            }
            Err(_) => {
                debug!(endpoint = %url, "[CATALOG] probe timed out");
                None
            }
        }
    }
}
