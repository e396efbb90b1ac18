//! Application wiring.
//!
//! Builds every component from an [`EngineConfig`], spawns the
//! lifecycle actor and the endpoint prober, and hands out an
//! [`EngineHandle`] for the control surface.

use crate::config::EngineConfig;
use crate::control::EngineHandle;
use crate::error::EngineResult;
use sentinel_lifecycle::{AccountLedger, LifecycleDeps, ManagerConfig, OrderLifecycleManager};
use sentinel_risk::{CircuitBreaker, TradeActivity};
use sentinel_rpc::{
    spawn_prober, EndpointHealth, HttpTransport, ProberConfig, RateAdmission, RpcEndpointPool,
    RpcTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The assembled engine.
pub struct Application {
    handle: EngineHandle,
    lifecycle_join: JoinHandle<()>,
    prober_join: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Application {
    /// Wire up all components and spawn the background tasks.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new(Duration::from_millis(
            config.pool.attempt_timeout_ms,
        ))?);
        Self::with_transport(config, transport)
    }

    /// Same wiring with a caller-supplied transport (testing).
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn RpcTransport>,
    ) -> EngineResult<Self> {
        let params = Arc::new(parking_lot::RwLock::new(config.risk.clone()));
        let breaker = Arc::new(CircuitBreaker::new(
            config.risk.clone(),
            config.breaker.clone(),
        ));
        let activity = Arc::new(TradeActivity::new());
        let admission = Arc::new(RateAdmission::new(config.admission.clone()));
        let ledger = Arc::new(AccountLedger::new(config.initial_balance));

        let endpoints: Vec<EndpointHealth> = config
            .endpoints
            .iter()
            .map(|e| EndpointHealth::new(e.url.clone(), e.weight))
            .collect();
        let pool = Arc::new(RpcEndpointPool::new(
            endpoints,
            transport,
            config.pool.clone(),
        ));

        let cancel = CancellationToken::new();
        let prober_join = spawn_prober(
            pool.clone(),
            ProberConfig {
                interval: Duration::from_secs(config.prober_interval_secs),
            },
            cancel.child_token(),
        );

        let deps = LifecycleDeps {
            breaker: breaker.clone(),
            activity,
            admission: admission.clone(),
            pool: pool.clone(),
            ledger: ledger.clone(),
            params: params.clone(),
        };
        let manager_config = ManagerConfig {
            submission_deadline: Duration::from_secs(config.submission_deadline_secs),
            ..Default::default()
        };
        let (lifecycle, lifecycle_join) = OrderLifecycleManager::spawn(deps, manager_config);

        info!(
            endpoints = config.endpoints.len(),
            balance = %config.initial_balance,
            "Engine assembled"
        );

        Ok(Self {
            handle: EngineHandle {
                breaker,
                lifecycle,
                ledger,
                pool,
                admission,
                params,
            },
            lifecycle_join,
            prober_join,
            cancel,
        })
    }

    /// Control handle for the running engine.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Run until interrupted, then shut down cleanly.
    pub async fn run(self) -> EngineResult<()> {
        info!("Engine running, press Ctrl+C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Stop the prober and drain the lifecycle actor.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.lifecycle.shutdown().await;
        let _ = self.lifecycle_join.await;
        let _ = self.prober_join.await;

        let account = self.handle.ledger.snapshot();
        info!(
            balance = %account.balance,
            realized_pnl = %account.realized_pnl,
            "Engine stopped"
        );
    }
}
