//! Background health prober.
//!
//! Visits every non-healthy endpoint at a fixed interval so that
//! degraded endpoints get failure-counter resets on recovery and
//! blacklisted endpoints can earn their way back into rotation.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pool::RpcEndpointPool;

/// Probing cadence.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Interval between probe rounds.
    pub interval: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Spawn the prober loop. Cancelling the token stops it after the
/// current round.
pub fn spawn_prober(
    pool: Arc<RpcEndpointPool>,
    config: ProberConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = config.interval.as_secs(), "Endpoint prober started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Endpoint prober stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let targets = pool.probe_targets();
            if targets.is_empty() {
                continue;
            }
            debug!(count = targets.len(), "Probing unhealthy endpoints");
            for url in targets {
                if cancel.is_cancelled() {
                    return;
                }
                pool.probe(&url).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointHealth, EndpointState, HealthThresholds};
    use crate::pool::{MockRpcTransport, PoolConfig};

    #[tokio::test(start_paused = true)]
    async fn test_prober_recovers_blacklisted_endpoint() {
        let thresholds = HealthThresholds::default();
        let mut bad = EndpointHealth::new("https://rpc.example/bad", 10);
        for _ in 0..6 {
            bad.record_failure(&thresholds);
        }

        let mut transport = MockRpcTransport::new();
        transport.expect_probe().returning(|_| Ok(()));

        let pool = Arc::new(RpcEndpointPool::new(
            vec![bad],
            Arc::new(transport),
            PoolConfig::default(),
        ));

        let cancel = CancellationToken::new();
        let handle = spawn_prober(
            pool.clone(),
            ProberConfig {
                interval: Duration::from_secs(1),
            },
            cancel.clone(),
        );

        // Three probe rounds clear the default probation.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::task::yield_now().await;

        assert_eq!(pool.health()[0].state, EndpointState::Degraded);

        cancel.cancel();
        handle.await.unwrap();
    }
}
