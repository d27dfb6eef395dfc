//! Dead-air monitoring
//!
//! A background task samples the silence clock against the agent's
//! configured thresholds. Crossing a threshold triggers a check-in
//! utterance; exhausting the check-in budget or the call-duration cap ends
//! the call. Check-ins themselves do not reset the silence clock: the
//! thresholds are measured from the last real activity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use parley_config::constants::dead_air::SAMPLE_INTERVAL_MS;
use parley_config::AgentConfig;
use parley_core::EndReason;

/// What the monitor needs from the call. Implemented by the orchestrator;
/// tests use a scripted double.
#[async_trait]
pub trait DeadAirHooks: Send + Sync {
    /// Last real activity: user speech or a content response finishing.
    /// Check-in utterances must not move this.
    fn last_activity(&self) -> Instant;

    /// Agent is mid-response; sampling pauses but the clock keeps running.
    fn agent_is_active(&self) -> bool;

    fn call_started(&self) -> Instant;

    /// Synthesize the configured check-in prompt. Returns false if the call
    /// is no longer in a state where a check-in makes sense.
    async fn check_in(&self, number: u32) -> bool;

    async fn end_call(&self, reason: EndReason);
}

pub struct DeadAirMonitor;

impl DeadAirMonitor {
    pub fn spawn(config: Arc<AgentConfig>, hooks: Arc<dyn DeadAirHooks>) -> JoinHandle<()> {
        Self::spawn_with_interval(config, hooks, Duration::from_millis(SAMPLE_INTERVAL_MS))
    }

    /// Sampling interval is injectable for tests.
    pub fn spawn_with_interval(
        config: Arc<AgentConfig>,
        hooks: Arc<dyn DeadAirHooks>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(run_monitor(config, hooks, interval))
    }
}

async fn run_monitor(config: Arc<AgentConfig>, hooks: Arc<dyn DeadAirHooks>, interval: Duration) {
    let thresholds = config.silence_check_in_ms.clone();
    if thresholds.is_empty() {
        return;
    }
    let max_call = Duration::from_secs(config.max_call_seconds);
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Base of the current silence window; crossing counter resets with it
    let mut base = hooks.last_activity();
    let mut fired: usize = 0;

    loop {
        tick.tick().await;

        if hooks.call_started().elapsed() >= max_call {
            tracing::info!("call duration cap reached");
            hooks.end_call(EndReason::MaxDuration).await;
            return;
        }

        let activity = hooks.last_activity();
        if activity > base {
            base = activity;
            fired = 0;
        }

        if hooks.agent_is_active() {
            continue;
        }

        let silence = base.elapsed();
        let Some(&threshold_ms) = thresholds.get(fired) else {
            continue;
        };
        if silence < Duration::from_millis(threshold_ms) {
            continue;
        }

        if fired as u32 >= config.max_check_ins {
            tracing::info!(check_ins = fired, "check-in budget exhausted");
            hooks.end_call(EndReason::MaxCheckIns).await;
            return;
        }

        fired += 1;
        tracing::info!(number = fired, silence_ms = silence.as_millis() as u64, "dead-air check-in");
        if !hooks.check_in(fired as u32).await {
            return;
        }
    }
}
