//! JSON-RPC over HTTP. The resilient client talks to endpoints only through
//! [`RpcTransport`], which keeps retry and failover logic testable without a node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, RpcError};

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send one JSON-RPC request to `endpoint` and return its `result` member.
    async fn request(&self, endpoint: &str, method: &str, params: Value) -> Result<Value>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Longest slice of a non-2xx body kept in the error text.
const MAX_ERROR_BODY: usize = 200;

pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, next_id: AtomicU64::new(1) })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, endpoint: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let resp = self.client.post(endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body = match status.canonical_reason() {
                Some(reason) if text.is_empty() => reason.to_string(),
                _ => text.chars().take(MAX_ERROR_BODY).collect(),
            };
            return Err(RpcError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: RpcResponse = resp.json().await?;
        into_result(parsed)
    }
}

fn into_result(resp: RpcResponse) -> Result<Value> {
    if let Some(err) = resp.error {
        return Err(RpcError::JsonRpc { code: err.code, message: err.message }.into());
    }
    resp.result.ok_or_else(|| RpcError::MissingResult.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn error_member_wins_over_result() {
        let resp: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "rate limit exceeded" }
        }))
        .unwrap();
        match into_result(resp) {
            Err(AppError::Rpc(RpcError::JsonRpc { code, message })) => {
                assert_eq!(code, -32005);
                assert_eq!(message, "rate limit exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_result_is_an_error() {
        let resp: RpcResponse = serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1 })).unwrap();
        assert!(matches!(into_result(resp), Err(AppError::Rpc(RpcError::MissingResult))));
    }

    #[test]
    fn result_is_returned() {
        let resp: RpcResponse =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" })).unwrap();
        assert_eq!(into_result(resp).unwrap(), json!("0x10"));
    }
}
