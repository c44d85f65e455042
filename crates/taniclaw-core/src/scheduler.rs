//! Periodic sweeps. The first tick fires immediately.
//!
//! Each sweep builds its own [`Agent`] and drops it when done, so the store
//! is only held while a sweep runs. Other processes (a manual `act` or
//! `run`) can open it between ticks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::agent::{Agent, PlantCycle};
use crate::config::SchedulerConfig;
use crate::error::Result;

/// Builds the agent for one sweep. May block while the store is busy.
pub type AgentFactory = Arc<dyn Fn() -> Result<Arc<Agent>> + Send + Sync>;

pub struct Scheduler {
    open_agent: AgentFactory,
    interval: Duration,
}

impl Scheduler {
    pub fn new<F>(open_agent: F, config: &SchedulerConfig) -> Self
    where
        F: Fn() -> Result<Arc<Agent>> + Send + Sync + 'static,
    {
        let minutes = config.interval_minutes.max(1);
        Self::with_interval(open_agent, Duration::from_secs(minutes * 60))
    }

    pub fn with_interval<F>(open_agent: F, interval: Duration) -> Self
    where
        F: Fn() -> Result<Arc<Agent>> + Send + Sync + 'static,
    {
        Self {
            open_agent: Arc::new(open_agent),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep, outside the timer.
    pub async fn trigger_now(&self) -> Result<Vec<PlantCycle>> {
        tracing::info!("manual cycle triggered");
        self.sweep().await
    }

    async fn sweep(&self) -> Result<Vec<PlantCycle>> {
        let open = self.open_agent.clone();
        let agent = tokio::task::spawn_blocking(move || open()).await??;
        agent.run_cycle().await
    }

    /// Sweep on every tick until `shutdown` resolves. Returns the number of
    /// sweeps started. A failed sweep is logged and the loop keeps going.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut sweeps = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    sweeps += 1;
                    match self.sweep().await {
                        Ok(cycles) => tracing::debug!(sweep = sweeps, plants = cycles.len(), "sweep finished"),
                        Err(e) => tracing::error!(sweep = sweeps, error = %e, "scheduled sweep failed"),
                    }
                }
            }
        }
        tracing::info!(sweeps, "scheduler stopped");
        sweeps
    }
}
