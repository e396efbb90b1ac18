//! Weighted RPC endpoint pool with bounded failover.
//!
//! Selection is weighted-random over all selectable endpoints:
//! degraded ones stay in the draw at a quarter of their configured
//! weight, only blacklisted endpoints are excluded.

use rand::Rng;
use sentinel_core::{Price, PositionId, Side, Size, TokenId};
use sentinel_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoint::{EndpointHealth, EndpointState, HealthThresholds};
use crate::error::{RpcResult, SubmissionError};

/// Weight divisor applied to degraded endpoints in the draw.
const DEGRADED_WEIGHT_DIVISOR: u32 = 4;

// ============================================================================
// Wire shapes
// ============================================================================

/// Order submission payload sent to an RPC endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-assigned id, stable across retries for dedup upstream.
    pub client_id: PositionId,
    /// Token to trade.
    pub token: TokenId,
    /// Direction.
    pub side: Side,
    /// Base-asset quantity.
    pub quantity: Size,
    /// Limit price.
    pub limit_price: Price,
}

/// Confirmation returned by an endpoint for an accepted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Endpoint-assigned order reference.
    pub order_ref: String,
    /// Actual fill price.
    pub fill_price: Price,
    /// Endpoint that accepted the order.
    #[serde(default)]
    pub endpoint: String,
}

// ============================================================================
// Transport seam
// ============================================================================

/// Transport over which orders and probes reach an endpoint.
///
/// The pool owns retry, failover and health bookkeeping; the transport
/// does exactly one network call.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync {
    /// Submit an order to one endpoint.
    async fn submit(&self, url: &str, request: &OrderRequest) -> RpcResult<SubmissionReceipt>;

    /// Lightweight health probe against one endpoint.
    async fn probe(&self, url: &str) -> RpcResult<()>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC over HTTPS transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport. `timeout` caps a single request on top of
    /// the pool's per-attempt timeout.
    pub fn new(timeout: Duration) -> RpcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Permanent(format!("HTTP client build failed: {e}")))?;
        Ok(Self { client })
    }

    async fn call<P: Serialize + Sync, R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &P,
    ) -> RpcResult<R> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Timeout(0)
                } else {
                    SubmissionError::Transient(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SubmissionError::RateLimited);
        }
        if status.is_server_error() {
            return Err(SubmissionError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Permanent(format!("HTTP {status}: {body}")));
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| SubmissionError::Transient(format!("Malformed response: {e}")))?;

        if let Some(err) = body.error {
            // -32005 is the conventional rate-limit code.
            if err.code == -32005 {
                return Err(SubmissionError::RateLimited);
            }
            return Err(SubmissionError::Permanent(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }

        body.result
            .ok_or_else(|| SubmissionError::Transient("Empty RPC result".to_string()))
    }
}

#[async_trait::async_trait]
impl RpcTransport for HttpTransport {
    async fn submit(&self, url: &str, request: &OrderRequest) -> RpcResult<SubmissionReceipt> {
        self.call(url, "submitOrder", request).await
    }

    async fn probe(&self, url: &str) -> RpcResult<()> {
        let _: serde_json::Value = self.call(url, "getHealth", &()).await?;
        Ok(())
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Failover and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum submission attempts across all endpoints.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff between attempts, doubled each retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Per-attempt timeout.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Health state thresholds.
    #[serde(default)]
    pub thresholds: HealthThresholds,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_attempt_timeout_ms() -> u64 {
    5_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            thresholds: HealthThresholds::default(),
        }
    }
}

// ============================================================================
// RpcEndpointPool
// ============================================================================

/// Pool of weighted RPC endpoints with health-aware failover.
pub struct RpcEndpointPool {
    endpoints: parking_lot::RwLock<Vec<EndpointHealth>>,
    transport: Arc<dyn RpcTransport>,
    config: PoolConfig,
}

impl RpcEndpointPool {
    pub fn new(
        endpoints: Vec<EndpointHealth>,
        transport: Arc<dyn RpcTransport>,
        config: PoolConfig,
    ) -> Self {
        Self {
            endpoints: parking_lot::RwLock::new(endpoints),
            transport,
            config,
        }
    }

    /// Pick an endpoint URL by weighted random draw.
    ///
    /// Degraded endpoints stay in the draw at reduced weight, so they
    /// keep seeing traffic and can recover. `None` when everything is
    /// blacklisted.
    #[must_use]
    pub fn select(&self) -> Option<String> {
        let endpoints = self.endpoints.read();

        let pool: Vec<(&EndpointHealth, u32)> = endpoints
            .iter()
            .filter_map(|e| match e.state {
                EndpointState::Healthy => Some((e, e.weight)),
                EndpointState::Degraded => {
                    Some((e, (e.weight / DEGRADED_WEIGHT_DIVISOR).max(1)))
                }
                EndpointState::Blacklisted => None,
            })
            .collect();

        let total: u32 = pool.iter().map(|(_, w)| w).sum();
        if total == 0 {
            return None;
        }

        let mut pick = rand::thread_rng().gen_range(0..total);
        for (endpoint, weight) in &pool {
            if pick < *weight {
                return Some(endpoint.url.clone());
            }
            pick -= weight;
        }
        None
    }

    /// Submit with bounded failover.
    ///
    /// Transient failures rotate to the next draw with exponential
    /// backoff; permanent failures abort immediately. The token
    /// cancels promptly between and during attempts.
    pub async fn submit(
        &self,
        request: &OrderRequest,
        cancel: &CancellationToken,
    ) -> RpcResult<SubmissionReceipt> {
        let mut backoff = Duration::from_millis(self.config.base_backoff_ms);
        let attempt_timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let mut last_error = SubmissionError::EndpointExhausted;

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(SubmissionError::Cancelled);
            }

            let Some(url) = self.select() else {
                warn!(client_id = %request.client_id, "No selectable endpoint");
                return Err(SubmissionError::EndpointExhausted);
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
                res = tokio::time::timeout(attempt_timeout, self.transport.submit(&url, request)) => res,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(Ok(mut receipt)) => {
                    self.mark_success(&url);
                    Metrics::submission(&url, "ok");
                    Metrics::submission_latency(&url, latency_ms as f64);
                    debug!(
                        client_id = %request.client_id,
                        endpoint = %url,
                        attempt,
                        latency_ms,
                        "Order submitted"
                    );
                    receipt.endpoint = url;
                    return Ok(receipt);
                }
                Ok(Err(e)) if e.is_retryable() => {
                    self.mark_failure(&url);
                    Metrics::submission(&url, "error");
                    warn!(
                        client_id = %request.client_id,
                        endpoint = %url,
                        attempt,
                        error = %e,
                        "Transient submission failure, rotating endpoint"
                    );
                    last_error = e;
                }
                Ok(Err(e)) => {
                    Metrics::submission(&url, "rejected");
                    warn!(
                        client_id = %request.client_id,
                        endpoint = %url,
                        error = %e,
                        "Permanent submission failure"
                    );
                    return Err(e);
                }
                Err(_) => {
                    self.mark_failure(&url);
                    Metrics::submission(&url, "timeout");
                    warn!(
                        client_id = %request.client_id,
                        endpoint = %url,
                        attempt,
                        timeout_ms = self.config.attempt_timeout_ms,
                        "Submission attempt timed out"
                    );
                    last_error = SubmissionError::Timeout(self.config.attempt_timeout_ms);
                }
            }

            if attempt < self.config.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
            }
        }

        Err(last_error)
    }

    /// Probe one endpoint and feed the result into its health record.
    pub async fn probe(&self, url: &str) {
        let ok = self.transport.probe(url).await.is_ok();
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.record_probe(ok, &self.config.thresholds);
        }
    }

    /// URLs of endpoints the prober should visit (anything unhealthy).
    #[must_use]
    pub fn probe_targets(&self) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .filter(|e| e.state != EndpointState::Healthy)
            .map(|e| e.url.clone())
            .collect()
    }

    /// Snapshot of all endpoint health records.
    #[must_use]
    pub fn health(&self) -> Vec<EndpointHealth> {
        self.endpoints.read().clone()
    }

    fn mark_success(&self, url: &str) {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.record_success();
        }
    }

    fn mark_failure(&self, url: &str) {
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.iter_mut().find(|e| e.url == url) {
            endpoint.record_failure(&self.config.thresholds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> OrderRequest {
        OrderRequest {
            client_id: PositionId::new(),
            token: TokenId::new("SOL").unwrap(),
            side: Side::Buy,
            quantity: Size::new(dec!(0.2)),
            limit_price: Price::new(dec!(10)),
        }
    }

    fn receipt() -> SubmissionReceipt {
        SubmissionReceipt {
            order_ref: "ref-1".to_string(),
            fill_price: Price::new(dec!(10)),
            endpoint: String::new(),
        }
    }

    fn fast_config() -> PoolConfig {
        PoolConfig {
            max_attempts: 3,
            base_backoff_ms: 1,
            attempt_timeout_ms: 1_000,
            thresholds: HealthThresholds::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_uses_selected_endpoint() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_submit()
            .times(1)
            .returning(|_, _| Ok(receipt()));

        let pool = RpcEndpointPool::new(
            vec![EndpointHealth::new("https://rpc.example/a", 10)],
            Arc::new(transport),
            fast_config(),
        );

        let result = pool.submit(&order(), &CancellationToken::new()).await.unwrap();
        assert_eq!(result.order_ref, "ref-1");
        assert_eq!(result.endpoint, "https://rpc.example/a");
    }

    #[tokio::test]
    async fn test_transient_failures_retry_until_exhausted() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_submit()
            .times(3)
            .returning(|_, _| Err(SubmissionError::Transient("boom".to_string())));

        let pool = RpcEndpointPool::new(
            vec![EndpointHealth::new("https://rpc.example/a", 10)],
            Arc::new(transport),
            fast_config(),
        );

        let err = pool
            .submit(&order(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Transient(_)));
    }

    #[tokio::test]
    async fn test_permanent_failure_aborts_without_retry() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_submit()
            .times(1)
            .returning(|_, _| Err(SubmissionError::Permanent("bad order".to_string())));

        let pool = RpcEndpointPool::new(
            vec![EndpointHealth::new("https://rpc.example/a", 10)],
            Arc::new(transport),
            fast_config(),
        );

        let err = pool
            .submit(&order(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_blacklisted_endpoint_leaves_rotation() {
        let thresholds = HealthThresholds::default();
        let mut bad = EndpointHealth::new("https://rpc.example/bad", 100);
        for _ in 0..6 {
            bad.record_failure(&thresholds);
        }
        assert_eq!(bad.state, EndpointState::Blacklisted);

        let pool = RpcEndpointPool::new(
            vec![bad, EndpointHealth::new("https://rpc.example/good", 1)],
            Arc::new(MockRpcTransport::new()),
            fast_config(),
        );

        for _ in 0..50 {
            assert_eq!(pool.select().unwrap(), "https://rpc.example/good");
        }
    }

    #[tokio::test]
    async fn test_all_blacklisted_is_exhausted() {
        let thresholds = HealthThresholds::default();
        let mut bad = EndpointHealth::new("https://rpc.example/bad", 10);
        for _ in 0..6 {
            bad.record_failure(&thresholds);
        }

        let pool = RpcEndpointPool::new(vec![bad], Arc::new(MockRpcTransport::new()), fast_config());
        assert!(pool.select().is_none());

        let err = pool
            .submit(&order(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::EndpointExhausted));
    }

    #[tokio::test]
    async fn test_degraded_deprioritized_but_still_drawn() {
        let thresholds = HealthThresholds::default();
        let mut degraded = EndpointHealth::new("https://rpc.example/degraded", 100);
        for _ in 0..3 {
            degraded.record_failure(&thresholds);
        }
        assert_eq!(degraded.state, EndpointState::Degraded);

        // Degraded enters the draw at weight 100/4 = 25 alongside the
        // healthy endpoint at 10; over many draws both must appear.
        let pool = RpcEndpointPool::new(
            vec![
                degraded.clone(),
                EndpointHealth::new("https://rpc.example/healthy", 10),
            ],
            Arc::new(MockRpcTransport::new()),
            fast_config(),
        );
        let mut saw_degraded = false;
        let mut saw_healthy = false;
        for _ in 0..500 {
            match pool.select().unwrap().as_str() {
                "https://rpc.example/degraded" => saw_degraded = true,
                "https://rpc.example/healthy" => saw_healthy = true,
                other => panic!("unexpected endpoint {other}"),
            }
        }
        assert!(saw_degraded, "degraded endpoint was excluded from the draw");
        assert!(saw_healthy);

        // Alone, it still serves.
        let pool = RpcEndpointPool::new(
            vec![degraded],
            Arc::new(MockRpcTransport::new()),
            fast_config(),
        );
        assert_eq!(pool.select().unwrap(), "https://rpc.example/degraded");
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_submit()
            .returning(|_, _| Err(SubmissionError::Transient("boom".to_string())));

        let pool = RpcEndpointPool::new(
            vec![EndpointHealth::new("https://rpc.example/a", 10)],
            Arc::new(transport),
            fast_config(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pool.submit(&order(), &cancel).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Cancelled));
    }

    #[tokio::test]
    async fn test_probe_recovery_path() {
        let thresholds = HealthThresholds::default();
        let mut bad = EndpointHealth::new("https://rpc.example/bad", 10);
        for _ in 0..6 {
            bad.record_failure(&thresholds);
        }

        let mut transport = MockRpcTransport::new();
        transport.expect_probe().times(3).returning(|_| Ok(()));

        let pool = RpcEndpointPool::new(vec![bad], Arc::new(transport), fast_config());
        assert_eq!(pool.probe_targets(), vec!["https://rpc.example/bad"]);

        for _ in 0..3 {
            pool.probe("https://rpc.example/bad").await;
        }
        assert_eq!(pool.health()[0].state, EndpointState::Degraded);
        assert!(pool.select().is_some());
    }
}
