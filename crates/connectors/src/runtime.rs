//! Guarded call runtime: per-key circuit breakers, retry with exponential
//! backoff and jitter, per-call timeouts and cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use demand_core::config::{CircuitBreakerConfig, RetryConfig};
use demand_core::{CampaignError, CampaignResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─── Circuit Breaker ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; requests pass through.
    Closed,
    /// Too many failures; requests are rejected.
    Open,
    /// Testing recovery; limited requests allowed.
    HalfOpen,
}

/// Circuit breaker protecting calls made on behalf of one campaign.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: parking_lot::Mutex<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    opened_at: parking_lot::Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: parking_lot::Mutex::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at: parking_lot::Mutex::new(None),
        }
    }

    /// Check if a request is allowed through the circuit.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let open_for = Duration::from_secs(self.config.open_duration_secs);
                match *self.opened_at.lock() {
                    Some(opened_at) if opened_at.elapsed() >= open_for => {
                        *state = CircuitState::HalfOpen;
                        self.success_count.store(0, Ordering::Relaxed);
                        info!("circuit breaker transitioning to half-open");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.half_open_successes {
                    *state = CircuitState::Closed;
                    self.failure_count.store(0, Ordering::Relaxed);
                    self.success_count.store(0, Ordering::Relaxed);
                    info!("circuit breaker closed after recovery");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if count >= self.config.failure_threshold {
                    *state = CircuitState::Open;
                    *self.opened_at.lock() = Some(Instant::now());
                    warn!(failures = count, "circuit breaker opened due to failures");
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open goes back to open
                *state = CircuitState::Open;
                *self.opened_at.lock() = Some(Instant::now());
                self.success_count.store(0, Ordering::Relaxed);
                warn!("circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }
}

// ─── Retry Policy ───────────────────────────────────────────────────────

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Randomize each delay by ±25%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Compute the backoff duration for a given attempt (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_backoff_ms as f64);

        let final_ms = if self.jitter {
            capped_ms * rand::thread_rng().gen_range(0.75..=1.25)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms as u64)
    }
}

// ─── Guarded Caller ─────────────────────────────────────────────────────

/// Wraps every call to one external service. Breakers are keyed by
/// campaign so a single failing campaign cannot starve the others.
pub struct GuardedCaller {
    service: &'static str,
    retry: RetryPolicy,
    call_timeout: Duration,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    cancel: CancellationToken,
}

impl GuardedCaller {
    pub fn new(
        service: &'static str,
        retry: RetryPolicy,
        call_timeout: Duration,
        breaker_config: CircuitBreakerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            retry,
            call_timeout,
            breaker_config,
            breakers: DashMap::new(),
            cancel,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// The breaker for `key`, created closed on first use.
    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config.clone())))
            .clone()
    }

    pub fn circuit_state(&self, key: &str) -> CircuitState {
        self.breakers
            .get(key)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Run `op` under the breaker for `key`, retrying retryable failures.
    ///
    /// Permanent failures (rejections, malformed output) return immediately
    /// and do not count toward the breaker.
    pub async fn call<T, F, Fut>(&self, key: &str, operation: &str, op: F) -> CampaignResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CampaignResult<T>>,
    {
        self.run(key, operation, self.retry.max_retries, op).await
    }

    /// Like [`call`](Self::call) but never retries. For operations that are
    /// not safe to repeat, such as creating a campaign.
    pub async fn call_once<T, F, Fut>(&self, key: &str, operation: &str, op: F) -> CampaignResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CampaignResult<T>>,
    {
        self.run(key, operation, 0, op).await
    }

    async fn run<T, F, Fut>(
        &self,
        key: &str,
        operation: &str,
        max_retries: u32,
        mut op: F,
    ) -> CampaignResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CampaignResult<T>>,
    {
        let breaker = self.breaker(key);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CampaignError::Cancelled);
            }
            if !breaker.allow_request() {
                metrics::counter!("connector.circuit_rejections", "service" => self.service)
                    .increment(1);
                return Err(CampaignError::CircuitOpen(format!("{}/{}", self.service, key)));
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Err(CampaignError::Cancelled),
                res = tokio::time::timeout(self.call_timeout, op()) => match res {
                    Ok(inner) => inner,
                    Err(_) => Err(CampaignError::Timeout {
                        service: self.service.to_string(),
                        after_ms: self.call_timeout.as_millis() as u64,
                    }),
                },
            };
            metrics::histogram!("connector.latency_ms", "service" => self.service)
                .record(started.elapsed().as_millis() as f64);

            let err = match outcome {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.trips_circuit() {
                breaker.record_failure();
            }

            if !err.is_retryable() || attempt >= max_retries {
                metrics::counter!(
                    "connector.failures",
                    "service" => self.service,
                    "kind" => err.kind()
                )
                .increment(1);
                debug!(
                    service = self.service,
                    key = key,
                    operation = operation,
                    attempts = attempt + 1,
                    error = %err,
                    "external call failed"
                );
                return Err(err);
            }

            let delay = self.retry.backoff_for_attempt(attempt);
            attempt += 1;
            metrics::counter!("connector.retries", "service" => self.service).increment(1);
            warn!(
                service = self.service,
                key = key,
                operation = operation,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying external call"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CampaignError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
