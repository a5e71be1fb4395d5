//! Per-device health state and the cadence rules that drive it.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Observed reachability of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// Never probed, or the device has no usable address.
    #[default]
    Unknown,
    Up,
    Down,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Unknown => "unknown",
            Health::Up => "up",
            Health::Down => "down",
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Cadence for healthy devices, and for failing devices past `max_retries`.
    pub up_interval: Duration,
    /// Fast retry cadence while a device keeps failing.
    pub down_interval: Duration,
    pub max_retries: u32,
    /// Sleep between ticks when nothing is due.
    pub idle_interval: Duration,
    pub probe_timeout: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            up_interval: Duration::from_secs(10),
            down_interval: Duration::from_secs(2),
            max_retries: 3,
            idle_interval: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Health of one device as tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    pub health: Health,
    /// Consecutive failed checks since the last success.
    pub retry_count: u32,
    pub next_check_due_at: Instant,
}

impl HealthState {
    /// Fresh `unknown` state, due at `due`.
    pub fn new(due: Instant) -> Self {
        Self {
            health: Health::Unknown,
            retry_count: 0,
            next_check_due_at: due,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_check_due_at <= now
    }

    /// Probe exited 0.
    pub fn record_success(&mut self, policy: &SchedulePolicy, now: Instant) {
        if self.health != Health::Up {
            debug!(from = %self.health, retries = self.retry_count, "device up");
        }
        self.health = Health::Up;
        self.retry_count = 0;
        self.next_check_due_at = now + policy.up_interval;
    }

    /// Probe exited non-zero or timed out.
    ///
    /// Failing devices are retried at `down_interval` until `max_retries`
    /// consecutive failures, then fall back to `up_interval`.
    pub fn record_failure(&mut self, policy: &SchedulePolicy, now: Instant) {
        self.health = Health::Down;
        self.retry_count = self.retry_count.saturating_add(1);
        let interval = if self.retry_count < policy.max_retries {
            policy.down_interval
        } else {
            if self.retry_count == policy.max_retries {
                warn!(retries = self.retry_count, "device still down, slowing checks");
            }
            policy.up_interval
        };
        self.next_check_due_at = now + interval;
    }

    /// No probe could be issued because the channel is unavailable.
    pub fn record_channel_unavailable(&mut self, policy: &SchedulePolicy, now: Instant) {
        self.health = Health::Down;
        self.retry_count = self.retry_count.saturating_add(1);
        self.next_check_due_at = now + policy.down_interval;
    }

    /// The device has no valid management address.
    pub fn mark_unaddressable(&mut self, policy: &SchedulePolicy, now: Instant) {
        self.health = Health::Unknown;
        self.retry_count = 0;
        self.next_check_due_at = now + policy.up_interval;
    }

    /// Due immediately with a clean retry count.
    pub fn refresh(&mut self, now: Instant) {
        self.retry_count = 0;
        self.next_check_due_at = now;
    }
}

/// Whether `mgmt_ip` is a syntactically valid IPv4 or IPv6 address.
pub fn is_probeable(mgmt_ip: &str) -> bool {
    mgmt_ip.trim().parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SchedulePolicy {
        SchedulePolicy::default()
    }

    #[test]
    fn starts_unknown_and_due() {
        let now = Instant::now();
        let state = HealthState::new(now);
        assert_eq!(state.health, Health::Unknown);
        assert_eq!(state.retry_count, 0);
        assert!(state.is_due(now));
    }

    #[test]
    fn success_resets_and_waits_up_interval() {
        let now = Instant::now();
        let mut state = HealthState::new(now);
        state.record_failure(&policy(), now);
        state.record_success(&policy(), now);
        assert_eq!(state.health, Health::Up);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(10));
    }

    #[test]
    fn failures_retry_fast_until_max_retries() {
        let now = Instant::now();
        let mut state = HealthState::new(now);

        state.record_failure(&policy(), now);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(2));
        state.record_failure(&policy(), now);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(2));
        state.record_failure(&policy(), now);
        assert_eq!(state.retry_count, 3);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(10));

        state.record_failure(&policy(), now);
        assert_eq!(state.health, Health::Down);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(10));
    }

    #[test]
    fn channel_unavailable_always_uses_down_interval() {
        let now = Instant::now();
        let mut state = HealthState::new(now);
        for _ in 0..5 {
            state.record_channel_unavailable(&policy(), now);
        }
        assert_eq!(state.health, Health::Down);
        assert_eq!(state.retry_count, 5);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(2));
    }

    #[test]
    fn unaddressable_goes_back_to_unknown() {
        let now = Instant::now();
        let mut state = HealthState::new(now);
        state.record_failure(&policy(), now);
        state.mark_unaddressable(&policy(), now);
        assert_eq!(state.health, Health::Unknown);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.next_check_due_at, now + Duration::from_secs(10));
    }

    #[test]
    fn address_validation() {
        assert!(is_probeable("10.25.4.37"));
        assert!(is_probeable(" 192.168.0.1 "));
        assert!(is_probeable("fe80::1"));
        assert!(!is_probeable(""));
        assert!(!is_probeable("10.0.0"));
        assert!(!is_probeable("10.0.0.256"));
        assert!(!is_probeable("switch-7.lab"));
    }

    #[test]
    fn health_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Health::Down).unwrap(), "\"down\"");
        assert_eq!(Health::Up.to_string(), "up");
    }
}
