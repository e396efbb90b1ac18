//! Per-endpoint health bookkeeping.
//!
//! State machine: `Healthy -> Degraded -> Blacklisted`, driven by
//! consecutive failures. Blacklisted endpoints leave rotation entirely
//! and only the background prober can bring them back, via `Degraded`
//! after a run of consecutive probe successes.

use chrono::{DateTime, Utc};
use sentinel_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Endpoint health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    Healthy,
    Degraded,
    Blacklisted,
}

impl EndpointState {
    /// Gauge encoding: 0=healthy, 1=degraded, 2=blacklisted.
    #[must_use]
    pub fn as_metric(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Blacklisted => 2,
        }
    }
}

/// Health thresholds shared by the pool and the prober.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Consecutive failures before `Healthy -> Degraded`.
    #[serde(default = "default_degrade_after")]
    pub degrade_after: u32,
    /// Consecutive failures before `Degraded -> Blacklisted`.
    #[serde(default = "default_blacklist_after")]
    pub blacklist_after: u32,
    /// Consecutive probe successes before `Blacklisted -> Degraded`.
    #[serde(default = "default_probe_successes")]
    pub probe_successes: u32,
}

fn default_degrade_after() -> u32 {
    3
}

fn default_blacklist_after() -> u32 {
    6
}

fn default_probe_successes() -> u32 {
    3
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degrade_after: default_degrade_after(),
            blacklist_after: default_blacklist_after(),
            probe_successes: default_probe_successes(),
        }
    }
}

/// Health record for one RPC endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    /// Endpoint URL.
    pub url: String,
    /// Static selection weight.
    pub weight: u32,
    /// Consecutive submission/probe failures.
    pub consecutive_failures: u32,
    /// Consecutive probe successes while blacklisted.
    pub probe_successes: u32,
    /// Last successful call.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Current state.
    pub state: EndpointState,
}

impl EndpointHealth {
    #[must_use]
    pub fn new(url: impl Into<String>, weight: u32) -> Self {
        let health = Self {
            url: url.into(),
            weight: weight.max(1),
            consecutive_failures: 0,
            probe_successes: 0,
            last_success_at: None,
            state: EndpointState::Healthy,
        };
        Metrics::endpoint_state(&health.url, health.state.as_metric());
        health
    }

    /// Record a successful call. Degraded endpoints recover to healthy
    /// immediately; blacklisted ones stay put until the prober clears
    /// them.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success_at = Some(Utc::now());
        if self.state == EndpointState::Degraded {
            info!(endpoint = %self.url, "Endpoint recovered to healthy");
            self.set_state(EndpointState::Healthy);
        }
    }

    /// Record a failed call and advance the state machine.
    pub fn record_failure(&mut self, thresholds: &HealthThresholds) {
        self.consecutive_failures += 1;
        self.probe_successes = 0;

        match self.state {
            EndpointState::Healthy if self.consecutive_failures >= thresholds.degrade_after => {
                warn!(
                    endpoint = %self.url,
                    failures = self.consecutive_failures,
                    "Endpoint degraded"
                );
                self.set_state(EndpointState::Degraded);
            }
            EndpointState::Degraded if self.consecutive_failures >= thresholds.blacklist_after => {
                warn!(
                    endpoint = %self.url,
                    failures = self.consecutive_failures,
                    "Endpoint blacklisted"
                );
                self.set_state(EndpointState::Blacklisted);
            }
            _ => {}
        }
    }

    /// Record a probe result for a blacklisted endpoint.
    pub fn record_probe(&mut self, ok: bool, thresholds: &HealthThresholds) {
        if self.state != EndpointState::Blacklisted {
            if ok {
                self.record_success();
            } else {
                self.record_failure(thresholds);
            }
            return;
        }

        if !ok {
            self.probe_successes = 0;
            return;
        }

        self.probe_successes += 1;
        if self.probe_successes >= thresholds.probe_successes {
            info!(
                endpoint = %self.url,
                probes = self.probe_successes,
                "Endpoint passed probation, re-entering rotation as degraded"
            );
            self.consecutive_failures = 0;
            self.probe_successes = 0;
            self.last_success_at = Some(Utc::now());
            self.set_state(EndpointState::Degraded);
        }
    }

    /// Whether the endpoint may be selected for submissions.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        self.state != EndpointState::Blacklisted
    }

    fn set_state(&mut self, state: EndpointState) {
        self.state = state;
        Metrics::endpoint_state(&self.url, state.as_metric());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_ladder_to_blacklist() {
        let thresholds = HealthThresholds::default();
        let mut health = EndpointHealth::new("https://rpc.example/a", 10);

        for _ in 0..2 {
            health.record_failure(&thresholds);
        }
        assert_eq!(health.state, EndpointState::Healthy);

        health.record_failure(&thresholds);
        assert_eq!(health.state, EndpointState::Degraded);

        for _ in 0..3 {
            health.record_failure(&thresholds);
        }
        assert_eq!(health.state, EndpointState::Blacklisted);
        assert!(!health.is_selectable());
    }

    #[test]
    fn test_success_resets_failures_and_recovers_degraded() {
        let thresholds = HealthThresholds::default();
        let mut health = EndpointHealth::new("https://rpc.example/a", 10);

        for _ in 0..3 {
            health.record_failure(&thresholds);
        }
        assert_eq!(health.state, EndpointState::Degraded);

        health.record_success();
        assert_eq!(health.state, EndpointState::Healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_success_at.is_some());
    }

    #[test]
    fn test_probe_probation_requires_consecutive_successes() {
        let thresholds = HealthThresholds::default();
        let mut health = EndpointHealth::new("https://rpc.example/a", 10);
        for _ in 0..6 {
            health.record_failure(&thresholds);
        }
        assert_eq!(health.state, EndpointState::Blacklisted);

        // A failed probe resets the streak.
        health.record_probe(true, &thresholds);
        health.record_probe(true, &thresholds);
        health.record_probe(false, &thresholds);
        assert_eq!(health.state, EndpointState::Blacklisted);

        health.record_probe(true, &thresholds);
        health.record_probe(true, &thresholds);
        health.record_probe(true, &thresholds);
        assert_eq!(health.state, EndpointState::Degraded);
        assert!(health.is_selectable());
    }
}
