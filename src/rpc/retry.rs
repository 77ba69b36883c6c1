use std::time::Duration;

use crate::config::Config;
use crate::error::AppError;

/// Substrings (lowercase) that mark an upstream throttling response.
pub const RATE_LIMIT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "call rate limit exhausted",
    "retry in",
    "rate exceeded",
    "throttled",
    "request limit",
    "quota exceeded",
    "api rate limit",
    "requests per second",
    "rpm limit",
    "rps limit",
];

/// Substrings (lowercase) of node errors caused by the request itself: an
/// oversized log range or response, or a reverting call. Any endpoint would
/// answer the same way.
pub const REQUEST_REJECTION_INDICATORS: &[&str] = &[
    "block range",
    "range too large",
    "range is too large",
    "query returned more than",
    "too many results",
    "response size",
    "response too large",
    "log response size exceeded",
    "max results",
    "execution reverted",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream throttling. Rotate away but keep the endpoint in the catalog.
    RateLimited,
    /// The node refused this particular request. Neither penalize nor rotate
    /// the endpoint, and do not retry; the caller decides how to reshape it.
    Rejected,
    /// Anything else: timeouts, resets, malformed responses, node errors.
    Hard,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Hard => write!(f, "hard"),
        }
    }
}

pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_INDICATORS.iter().any(|i| lower.contains(i))
}

pub fn is_request_rejection_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    REQUEST_REJECTION_INDICATORS.iter().any(|i| lower.contains(i))
}

/// Throttling wins over rejection when a message carries both.
pub fn classify(err: &AppError) -> FailureKind {
    let text = err.to_string();
    if is_rate_limit_message(&text) {
        FailureKind::RateLimited
    } else if is_request_rejection_message(&text) {
        FailureKind::Rejected
    } else {
        FailureKind::Hard
    }
}

/// How the resilient client retries one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Hard failures wait `base_delay * 2^(attempt - 1)`.
    pub base_delay: Duration,
    /// Fixed wait after a rate-limited attempt.
    pub rate_limit_delay: Duration,
    /// Upper bound on a single attempt.
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.retry_max_attempts,
            base_delay: cfg.retry_base_delay,
            rate_limit_delay: cfg.rate_limit_retry_delay,
            request_timeout: cfg.rpc_timeout,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::RateLimited => self.rate_limit_delay,
            FailureKind::Rejected => Duration::ZERO,
            FailureKind::Hard => {
                let exp = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::config::RETRY_BASE_DELAY_MS),
            rate_limit_delay: Duration::from_millis(crate::config::RATE_LIMIT_RETRY_DELAY_MS),
            request_timeout: Duration::from_secs(crate::config::RPC_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn rate_limit_matching_is_case_insensitive() {
        assert!(is_rate_limit_message("HTTP 429: Too Many Requests"));
        assert!(is_rate_limit_message("Call Rate Limit Exhausted, retry in 10s"));
        assert!(is_rate_limit_message("daily QUOTA EXCEEDED"));
        assert!(!is_rate_limit_message("execution reverted"));
        assert!(!is_rate_limit_message("connection reset by peer"));
    }

    #[test]
    fn classify_uses_error_text() {
        let throttled: AppError =
            RpcError::JsonRpc { code: -32005, message: "request throttled".into() }.into();
        assert_eq!(classify(&throttled), FailureKind::RateLimited);

        let timeout: AppError =
            RpcError::Timeout { endpoint: "https://a.example".into(), timeout_ms: 20_000 }.into();
        assert_eq!(classify(&timeout), FailureKind::Hard);
    }

    #[test]
    fn request_specific_errors_are_rejections() {
        for message in [
            "block range too large",
            "query returned more than 10000 results",
            "Log response size exceeded. You can make eth_getLogs requests with up to a 2K block range",
            "execution reverted",
        ] {
            let err: AppError = RpcError::JsonRpc { code: -32000, message: message.into() }.into();
            assert_eq!(classify(&err), FailureKind::Rejected, "{message}");
        }

        // Throttling takes precedence.
        let both: AppError =
            RpcError::JsonRpc { code: -32005, message: "rate limit: block range too large".into() }.into();
        assert_eq!(classify(&both), FailureKind::RateLimited);

        let internal: AppError = RpcError::JsonRpc { code: -32603, message: "internal error".into() }.into();
        assert_eq!(classify(&internal), FailureKind::Hard);
    }

    #[test]
    fn hard_failures_back_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1, FailureKind::Hard), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2, FailureKind::Hard), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3, FailureKind::Hard), Duration::from_secs(4));
    }

    #[test]
    fn rate_limited_failures_use_fixed_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1, FailureKind::RateLimited), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3, FailureKind::RateLimited), Duration::from_secs(1));
    }

    #[test]
    fn attempts_are_capped() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
