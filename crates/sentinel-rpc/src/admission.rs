//! Token-bucket admission control.
//!
//! One bucket per scope: a global bucket over everything, plus
//! per-route and per-key buckets. A call is admitted only when every
//! applicable bucket has a token; nothing is consumed on rejection.

use parking_lot::Mutex;
use sentinel_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a bucket covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every outbound call.
    Global,
    /// One logical route, e.g. "submit" or "probe".
    Route(String),
    /// One upstream API key.
    ApiKey(String),
}

impl Scope {
    fn label(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Route(_) => "route",
            Self::ApiKey(_) => "api_key",
        }
    }
}

/// Bucket tuning: sustained rate and burst ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Maximum stored tokens.
    pub burst: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            refill_per_sec: 10.0,
            burst: 20.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    config: BucketConfig,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: BucketConfig) -> Self {
        Self {
            config,
            tokens: config.burst,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.config.refill_per_sec).min(self.config.burst);
        self.last_refill = now;
    }

    fn has_token(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }

    fn take(&mut self) {
        self.tokens -= 1.0;
    }

    /// Time until one token is available.
    fn retry_after(&self, now: Instant) -> Duration {
        let mut probe = Bucket {
            config: self.config,
            tokens: self.tokens,
            last_refill: self.last_refill,
        };
        probe.refill(now);
        if probe.tokens >= 1.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - probe.tokens) / self.config.refill_per_sec)
    }
}

/// Admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected; retry no earlier than this.
    Rejected { retry_after: Duration },
}

impl Admission {
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Token-bucket rate admission over a set of scopes.
pub struct RateAdmission {
    default_config: BucketConfig,
    overrides: HashMap<Scope, BucketConfig>,
    buckets: Mutex<HashMap<Scope, Bucket>>,
}

impl RateAdmission {
    #[must_use]
    pub fn new(default_config: BucketConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Pin a specific scope to its own bucket configuration.
    #[must_use]
    pub fn with_override(mut self, scope: Scope, config: BucketConfig) -> Self {
        self.overrides.insert(scope, config);
        self
    }

    /// Admit a call covered by all of `scopes`, atomically.
    ///
    /// Either every bucket has a token and one is taken from each, or
    /// none is touched and the longest retry-after is returned.
    pub fn admit(&self, scopes: &[Scope]) -> Admission {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        for scope in scopes {
            buckets
                .entry(scope.clone())
                .or_insert_with(|| Bucket::new(self.bucket_config(scope)));
        }

        let mut retry_after = Duration::ZERO;
        let mut rejected_scope = None;
        for scope in scopes {
            let Some(bucket) = buckets.get_mut(scope) else {
                continue;
            };
            if !bucket.has_token(now) {
                let wait = bucket.retry_after(now);
                if wait > retry_after {
                    retry_after = wait;
                }
                rejected_scope.get_or_insert_with(|| scope.clone());
            }
        }

        if let Some(scope) = rejected_scope {
            debug!(scope = scope.label(), retry_after_ms = retry_after.as_millis() as u64, "Rate admission rejected");
            Metrics::admission_rejected(scope.label());
            return Admission::Rejected { retry_after };
        }

        for scope in scopes {
            if let Some(bucket) = buckets.get_mut(scope) {
                bucket.take();
            }
        }
        Admission::Admitted
    }

    fn bucket_config(&self, scope: &Scope) -> BucketConfig {
        self.overrides.get(scope).copied().unwrap_or(self.default_config)
    }
}
