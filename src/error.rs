use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("ABI decode error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record for token {token_id} cannot be stored: {reason}")]
    InvalidRecord { token_id: u64, reason: String },

    #[error("Health check failed against {endpoint}: {source}")]
    HealthCheck {
        endpoint: String,
        source: Box<AppError>,
    },

    #[error("Retries exhausted after {attempts} attempts (last endpoint {endpoint}): {source}")]
    RetriesExhausted {
        attempts: u32,
        endpoint: String,
        source: Box<AppError>,
    },

    #[error("Error budget exceeded: {errors} errors across {total_chunks} chunks (last: {last})")]
    ErrorBudgetExceeded {
        errors: usize,
        total_chunks: usize,
        last: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire-level JSON-RPC failures. The `Display` text of these is what the
/// rate-limit classifier matches against, so upstream messages are kept verbatim.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("response carried neither result nor error")]
    MissingResult,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("all known RPC endpoints failed and no replacement is available")]
    EndpointsExhausted,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for the failures that must end a snapshot run instead of being
    /// absorbed by the chunk error budget.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::HealthCheck { .. } | AppError::ErrorBudgetExceeded { .. } => true,
            AppError::Rpc(RpcError::EndpointsExhausted) => true,
            AppError::RetriesExhausted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_endpoints_are_fatal_even_when_wrapped() {
        let err = AppError::RetriesExhausted {
            attempts: 3,
            endpoint: "https://a.example".to_string(),
            source: Box::new(RpcError::EndpointsExhausted.into()),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn transient_rpc_errors_are_not_fatal() {
        let err: AppError = RpcError::JsonRpc { code: -32000, message: "header not found".into() }.into();
        assert!(!err.is_fatal());

        let wrapped = AppError::RetriesExhausted {
            attempts: 3,
            endpoint: "https://a.example".to_string(),
            source: Box::new(err),
        };
        assert!(!wrapped.is_fatal());
    }
}
