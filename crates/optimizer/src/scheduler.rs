//! Scheduler: runs the realtime and insight cycles on their own intervals
//! until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use demand_core::config::OptimizerConfig;
use demand_core::CampaignResult;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{CycleReport, OptimizationEngine};

pub struct OptimizationScheduler {
    engine: Arc<OptimizationEngine>,
    realtime_interval: Duration,
    insight_interval: Duration,
    startup_jitter: Duration,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl OptimizationScheduler {
    /// `cancel` should be the token the engine's callers were built with,
    /// so shutdown also interrupts in-flight calls and backoff sleeps.
    pub fn new(
        engine: Arc<OptimizationEngine>,
        config: &OptimizerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            engine,
            realtime_interval: Duration::from_secs(config.realtime_interval_secs.max(1)),
            insight_interval: Duration::from_secs(config.insight_interval_secs.max(1)),
            startup_jitter: Duration::from_millis(config.startup_jitter_ms),
            cancel,
            handles: Vec::new(),
        }
    }

    /// Spawn both cycle loops.
    pub fn start(&mut self) {
        let engine = self.engine.clone();
        self.handles.push(spawn_loop(
            "realtime",
            self.realtime_interval,
            self.startup_jitter,
            self.cancel.clone(),
            move || {
                let engine = engine.clone();
                async move { engine.run_realtime_cycle().await }
            },
        ));

        let engine = self.engine.clone();
        self.handles.push(spawn_loop(
            "insight",
            self.insight_interval,
            self.startup_jitter,
            self.cancel.clone(),
            move || {
                let engine = engine.clone();
                async move { engine.run_insight_cycle().await }
            },
        ));

        info!(
            realtime_secs = self.realtime_interval.as_secs(),
            insight_secs = self.insight_interval.as_secs(),
            "Optimization scheduler started"
        );
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Cancel both loops and wait for them to finish their current cycle.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task panicked");
            }
        }
        info!("Optimization scheduler stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    max_jitter: Duration,
    cancel: CancellationToken,
    mut cycle: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = CampaignResult<CycleReport>> + Send + 'static,
{
    tokio::spawn(async move {
        let delay = startup_delay(max_jitter);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = cycle().await {
                if cancel.is_cancelled() {
                    break;
                }
                warn!(cycle = name, error = %e, "Cycle failed");
            }
        }
        info!(cycle = name, "Cycle loop stopped");
    })
}

/// Random start offset in `[0, max_jitter]`.
fn startup_delay(max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return Duration::ZERO;
    }
    rand::thread_rng().gen_range(Duration::ZERO..=max_jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report() -> CycleReport {
        CycleReport {
            cycle_id: 1,
            kind: crate::engine::CycleKind::Realtime,
            campaigns: 0,
            succeeded: 0,
            failed: 0,
            actions_applied: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_cancelled() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_loop(
            "test",
            Duration::from_secs(60),
            Duration::ZERO,
            cancel.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(report())
                }
            },
        );

        // first tick fires immediately, then one per period
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_startup_delay_bounds() {
        assert_eq!(startup_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..50 {
            assert!(startup_delay(Duration::from_millis(250)) <= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_startup_jitter() {
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_loop(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(3600),
            cancel.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(report())
                }
            },
        );
        cancel.cancel();
        handle.await.unwrap();
        assert!(runs.load(Ordering::SeqCst) <= 1);
    }
}
