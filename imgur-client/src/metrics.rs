//! Request accounting for one rate-limited client.

use chrono::{DateTime, Utc};
use reposter_core::{CoreError, Credits};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    /// Rate limited or upstream overload; the call is retried after a cooldown
    Transient,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EndpointUsage {
    pub calls: u64,
    pub failures: u64,
    pub transient: u64,
    pub busy: Duration,
    pub slowest: Duration,
}

impl EndpointUsage {
    pub fn mean_latency(&self) -> Option<Duration> {
        u32::try_from(self.calls)
            .ok()
            .filter(|calls| *calls > 0)
            .map(|calls| self.busy / calls)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub endpoints: BTreeMap<String, EndpointUsage>,
    pub cooldowns: u64,
    pub time_cooling_down: Duration,
    /// Lowest user and app credit counters observed so far
    pub lowest_user_credits: Option<u32>,
    pub lowest_client_credits: Option<u32>,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.endpoints.values().map(|usage| usage.calls).sum()
    }

    pub fn transient_failures(&self) -> u64 {
        self.endpoints.values().map(|usage| usage.transient).sum()
    }

    pub fn failures(&self) -> u64 {
        self.endpoints.values().map(|usage| usage.failures).sum()
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    usage: RwLock<UsageSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_call(&self, endpoint: &str, elapsed: Duration, outcome: CallOutcome) {
        let mut usage = self.usage.write().await;
        usage.last_call_at = Some(Utc::now());

        let entry = usage.endpoints.entry(endpoint.to_string()).or_default();
        entry.calls += 1;
        entry.busy += elapsed;
        entry.slowest = entry.slowest.max(elapsed);
        match outcome {
            CallOutcome::Succeeded => {}
            CallOutcome::Transient => entry.transient += 1,
            CallOutcome::Failed => entry.failures += 1,
        }
    }

    pub async fn record_cooldown(&self, duration: Duration) {
        let mut usage = self.usage.write().await;
        usage.cooldowns += 1;
        usage.time_cooling_down += duration;
    }

    pub async fn record_credits(&self, credits: &Credits) {
        let mut usage = self.usage.write().await;
        usage.lowest_user_credits = Some(
            usage
                .lowest_user_credits
                .map_or(credits.user_remaining, |low| low.min(credits.user_remaining)),
        );
        usage.lowest_client_credits = Some(
            usage
                .lowest_client_credits
                .map_or(credits.client_remaining, |low| low.min(credits.client_remaining)),
        );
    }

    pub async fn snapshot(&self) -> UsageSnapshot {
        self.usage.read().await.clone()
    }
}
