//! Per-engine suspension ("ban") tracking.
//!
//! Tracks failure streaks per `(engine, reason)` pair and temporarily
//! removes engines from dispatch after failures. Each pair has its own
//! state machine; reasons are independent of each other.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  failure   ┌──────────┐  threshold / timed reason  ┌───────────┐
//! │ Active ├───────────►│ Degraded ├───────────────────────────►│ Suspended │
//! └───▲────┘            └────┬─────┘                            └─────┬─────┘
//!     │      success         │                                        │
//!     ├──────────────────────┘          window elapsed (lazy check)   │
//!     └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reasons listed in [`BanPolicy::suspended_times`] skip `Degraded` and
//! suspend on the first failure, escalating on repeats inside the lookback
//! window.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{ConfigError, FailureKind};
use crate::types::EngineStatus;

/// Failure category that ban state is tracked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanReason {
    AccessDenied,
    Captcha,
    TooManyRequests,
    Timeout,
    /// Everything else: parse and network errors, pool exhaustion, panics.
    Error,
}

impl BanReason {
    pub const ALL: [BanReason; 5] = [
        Self::AccessDenied,
        Self::Captcha,
        Self::TooManyRequests,
        Self::Timeout,
        Self::Error,
    ];

    pub fn from_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::AccessDenied => Self::AccessDenied,
            FailureKind::Captcha => Self::Captcha,
            FailureKind::TooManyRequests => Self::TooManyRequests,
            FailureKind::Timeout => Self::Timeout,
            FailureKind::ParseError
            | FailureKind::NetworkError
            | FailureKind::PoolExhausted
            | FailureKind::Panicked => Self::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::Captcha => "captcha",
            Self::TooManyRequests => "too_many_requests",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }

    /// Parse the snake_case name used in settings files.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == raw)
    }
}

impl fmt::Display for BanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable phase of one `(engine, reason)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanPhase {
    /// No recent failures.
    Active,
    /// Failing, but not suspended yet.
    Degraded,
    /// Excluded from dispatch until the window ends.
    Suspended,
}

/// Ban state for a single `(engine, reason)` pair.
#[derive(Debug, Clone)]
pub struct BanState {
    pub failure_streak: u32,
    /// When set, strictly in the future at the time it was set.
    pub suspended_until: Option<Instant>,
    pub reason: BanReason,
    /// Number of suspensions in the current escalation chain.
    suspensions: u32,
    /// End of the last suspension, or time of the last failure when the
    /// failure did not suspend. Anchors the lookback window.
    window_end: Option<Instant>,
}

impl BanState {
    fn new(reason: BanReason) -> Self {
        Self {
            failure_streak: 0,
            suspended_until: None,
            reason,
            suspensions: 0,
            window_end: None,
        }
    }

    pub fn phase(&self, now: Instant) -> BanPhase {
        match self.suspended_until {
            Some(until) if now < until => BanPhase::Suspended,
            _ if self.failure_streak > 0 && self.suspended_until.is_none() => BanPhase::Degraded,
            _ => BanPhase::Active,
        }
    }

    fn is_suspended(&self, now: Instant) -> bool {
        self.suspended_until.is_some_and(|until| now < until)
    }

    /// Lift an elapsed suspension. Escalation history is kept so that a
    /// repeat failure inside the lookback window escalates.
    fn expire(&mut self, now: Instant) -> bool {
        match self.suspended_until {
            Some(until) if now >= until => {
                self.suspended_until = None;
                self.failure_streak = 0;
                true
            }
            _ => false,
        }
    }

    fn clear(&mut self) {
        self.failure_streak = 0;
        self.suspended_until = None;
        self.suspensions = 0;
        self.window_end = None;
    }
}

/// Upper bound for every duration in a [`BanPolicy`].
pub const MAX_BAN_DURATION: Duration = Duration::from_secs(366 * 86_400);

/// Configuration for suspension behaviour.
#[derive(Debug, Clone)]
pub struct BanPolicy {
    /// Reasons that suspend immediately, with their base duration.
    pub suspended_times: BTreeMap<BanReason, Duration>,
    /// Multiplier applied per repeat suspension inside the lookback window.
    pub escalation_factor: f64,
    /// Cap for escalated suspensions.
    pub max_suspension: Duration,
    /// How long after a suspension ends a new failure still escalates.
    pub lookback: Duration,
    /// Consecutive failures of an untimed reason before suspending.
    pub failure_threshold: u32,
    /// Per-failure suspension for untimed reasons once over the threshold.
    pub ban_time_on_fail: Duration,
    /// Cap for untimed-reason suspensions.
    pub max_ban_time_on_fail: Duration,
}

impl Default for BanPolicy {
    fn default() -> Self {
        let suspended_times = BTreeMap::from([
            (BanReason::AccessDenied, Duration::from_secs(86_400)),
            (BanReason::Captcha, Duration::from_secs(86_400)),
            (BanReason::TooManyRequests, Duration::from_secs(3_600)),
        ]);
        Self {
            suspended_times,
            escalation_factor: 2.0,
            max_suspension: Duration::from_secs(1_296_000),
            lookback: Duration::from_secs(3_600),
            failure_threshold: 3,
            ban_time_on_fail: Duration::from_secs(5),
            max_ban_time_on_fail: Duration::from_secs(120),
        }
    }
}

impl BanPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((reason, _)) = self.suspended_times.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!(
                "suspended_times.{reason} must be greater than 0"
            )));
        }
        let bounded = self
            .suspended_times
            .iter()
            .map(|(reason, d)| (format!("suspended_times.{reason}"), *d))
            .chain([
                ("max_suspension".to_string(), self.max_suspension),
                ("lookback".to_string(), self.lookback),
                ("max_ban_time_on_fail".to_string(), self.max_ban_time_on_fail),
            ]);
        for (field, duration) in bounded {
            if duration > MAX_BAN_DURATION {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be at most {} seconds",
                    MAX_BAN_DURATION.as_secs()
                )));
            }
        }
        if !(self.escalation_factor.is_finite() && self.escalation_factor >= 1.0) {
            return Err(ConfigError::Invalid(
                "escalation_factor must be a finite number >= 1".into(),
            ));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "failure_threshold must be greater than 0".into(),
            ));
        }
        if self.ban_time_on_fail.is_zero() {
            return Err(ConfigError::Invalid(
                "ban_time_on_fail must be greater than 0".into(),
            ));
        }
        if self.max_ban_time_on_fail < self.ban_time_on_fail {
            return Err(ConfigError::Invalid(
                "max_ban_time_on_fail must be >= ban_time_on_fail".into(),
            ));
        }
        Ok(())
    }

    /// `base × factor^level`, capped at `max_suspension`.
    fn escalated(&self, base: Duration, level: u32) -> Duration {
        let exponent = i32::try_from(level.min(64)).unwrap_or(64);
        let secs = base.as_secs_f64() * self.escalation_factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_suspension.as_secs_f64()))
    }

    /// Suspension earned by `state` after its latest failure, if any.
    fn suspension_for(&self, state: &BanState, level: u32) -> Option<Duration> {
        if let Some(base) = self.suspended_times.get(&state.reason) {
            return Some(self.escalated(*base, level));
        }
        if state.failure_streak >= self.failure_threshold {
            return Some(
                self.ban_time_on_fail
                    .saturating_mul(state.failure_streak)
                    .min(self.max_ban_time_on_fail),
            );
        }
        None
    }
}

/// Point-in-time view of one tracked `(engine, reason)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanSnapshot {
    pub engine: String,
    pub reason: BanReason,
    pub phase: BanPhase,
    pub failure_streak: u32,
    /// Time left in the current suspension.
    pub remaining: Option<Duration>,
}

/// Keyed store of ban state with per-key atomic updates.
///
/// Every mutation goes through the map entry for its `(engine, reason)`
/// key, so concurrent dispatches updating different engines never contend
/// on a single lock and updates to one key are never lost.
#[derive(Debug, Default)]
pub struct BanTracker {
    policy: BanPolicy,
    states: DashMap<(String, BanReason), BanState>,
}

impl BanTracker {
    pub fn new(policy: BanPolicy) -> Self {
        Self {
            policy,
            states: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &BanPolicy {
        &self.policy
    }

    /// Record the outcome of a call to `engine`. The only mutator.
    ///
    /// Returns the new suspension deadline when this outcome suspended the
    /// engine.
    pub fn record_outcome(&self, engine: &str, status: EngineStatus) -> Option<Instant> {
        self.record_outcome_at(engine, status, Instant::now())
    }

    /// [`Self::record_outcome`] with an explicit clock reading.
    pub fn record_outcome_at(
        &self,
        engine: &str,
        status: EngineStatus,
        now: Instant,
    ) -> Option<Instant> {
        match status {
            EngineStatus::Ok => {
                self.record_success(engine, now);
                None
            }
            EngineStatus::Suspended => None,
            EngineStatus::Timeout | EngineStatus::Error(_) => {
                let kind = status.failure_kind()?;
                self.record_failure(engine, BanReason::from_failure(kind), now)
            }
        }
    }

    fn record_success(&self, engine: &str, now: Instant) {
        for reason in BanReason::ALL {
            if let Some(mut state) = self.states.get_mut(&(engine.to_string(), reason)) {
                if !state.is_suspended(now) {
                    state.clear();
                }
            }
        }
    }

    fn record_failure(&self, engine: &str, reason: BanReason, now: Instant) -> Option<Instant> {
        let mut entry = self
            .states
            .entry((engine.to_string(), reason))
            .or_insert_with(|| BanState::new(reason));
        let state = entry.value_mut();
        state.expire(now);

        let repeated = state
            .window_end
            .is_some_and(|end| now <= saturating_after(end, self.policy.lookback));
        let level = if repeated { state.suspensions } else { 0 };
        if !repeated {
            state.suspensions = 0;
        }
        state.failure_streak = state.failure_streak.saturating_add(1);

        match self.policy.suspension_for(state, level) {
            Some(duration) => {
                let until = saturating_after(now, duration);
                state.suspended_until = Some(until);
                state.suspensions = level + 1;
                state.window_end = Some(until);
                tracing::info!(
                    engine,
                    reason = %reason,
                    streak = state.failure_streak,
                    suspended_secs = duration.as_secs(),
                    "engine suspended"
                );
                Some(until)
            }
            None => {
                state.window_end = Some(now);
                tracing::debug!(
                    engine,
                    reason = %reason,
                    streak = state.failure_streak,
                    "engine degraded"
                );
                None
            }
        }
    }

    /// Whether `engine` is excluded from dispatch at `now`.
    ///
    /// Elapsed suspensions are lifted here, lazily.
    pub fn is_suspended(&self, engine: &str, now: Instant) -> bool {
        let mut suspended = false;
        for reason in BanReason::ALL {
            if let Some(mut state) = self.states.get_mut(&(engine.to_string(), reason)) {
                if state.is_suspended(now) {
                    suspended = true;
                } else if state.expire(now) {
                    tracing::info!(engine, reason = %reason, "engine suspension lifted");
                }
            }
        }
        suspended
    }

    /// Latest active suspension deadline of `engine`, if any.
    pub fn suspended_until(&self, engine: &str, now: Instant) -> Option<Instant> {
        BanReason::ALL
            .into_iter()
            .filter_map(|reason| {
                self.states
                    .get(&(engine.to_string(), reason))
                    .and_then(|state| state.suspended_until.filter(|until| now < *until))
            })
            .max()
    }

    /// State of one `(engine, reason)` pair, if it was ever touched.
    pub fn state(&self, engine: &str, reason: BanReason) -> Option<BanState> {
        self.states
            .get(&(engine.to_string(), reason))
            .map(|state| state.clone())
    }

    /// Every tracked pair, sorted by engine then reason.
    pub fn snapshot(&self, now: Instant) -> Vec<BanSnapshot> {
        let mut report: Vec<BanSnapshot> = self
            .states
            .iter()
            .map(|entry| {
                let ((engine, reason), state) = (entry.key(), entry.value());
                BanSnapshot {
                    engine: engine.clone(),
                    reason: *reason,
                    phase: state.phase(now),
                    failure_streak: state.failure_streak,
                    remaining: state
                        .suspended_until
                        .filter(|until| now < *until)
                        .map(|until| until - now),
                }
            })
            .collect();
        report.sort_by(|a, b| a.engine.cmp(&b.engine).then(a.reason.cmp(&b.reason)));
        report
    }

    /// Forget all state.
    pub fn reset(&self) {
        self.states.clear();
    }
}

/// `at + duration`, clamped to the furthest representable ban instead of
/// overflowing.
fn saturating_after(at: Instant, duration: Duration) -> Instant {
    at.checked_add(duration)
        .or_else(|| at.checked_add(MAX_BAN_DURATION))
        .unwrap_or(at)
}
