//! Login attempt limiter for the auth layer.
//!
//! Per-key state is `(count, window_start, blocked_until)` in a DashMap.
//! Every attempt counts; counts older than the attempt window start over.
//! The attempt that reaches `max_attempts` inside one window blocks the key
//! for the block window and restarts the count. Keys that are neither
//! blocked nor inside a live window are dropped by
//! [`LoginRateLimiter::purge_expired`].

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, Default)]
struct AttemptState {
    count: u32,
    window_start: Option<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

impl AttemptState {
    fn is_live(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.blocked_until {
            Some(until) if now < until => true,
            _ => self.count > 0 && self.window_start.is_some_and(|start| now < start + window),
        }
    }
}

/// Outcome of one login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    Allowed { remaining: u32 },
    Blocked { until: DateTime<Utc> },
}

impl AttemptVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AttemptVerdict::Allowed { .. })
    }
}

pub struct LoginRateLimiter {
    max_attempts: u32,
    block: Duration,
    window: Duration,
    attempts: DashMap<String, AttemptState>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: u32, block: Duration, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            block,
            window,
            attempts: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::minutes(config.block_minutes),
            Duration::minutes(config.window_minutes),
        )
    }

    /// Record an attempt for `key` (e.g. "login:<email>")
    pub fn check_attempt(&self, key: &str) -> AttemptVerdict {
        self.check_attempt_at(key, Utc::now())
    }

    pub fn check_attempt_at(&self, key: &str, now: DateTime<Utc>) -> AttemptVerdict {
        let mut state = self
            .attempts
            .entry(key.to_string())
            .or_insert_with(AttemptState::default);

        if let Some(until) = state.blocked_until {
            if now < until {
                return AttemptVerdict::Blocked { until };
            }
            state.blocked_until = None;
        }

        if state.window_start.is_none_or(|start| now >= start + self.window) {
            state.count = 0;
            state.window_start = Some(now);
        }

        state.count += 1;
        if state.count >= self.max_attempts {
            let until = now + self.block;
            state.blocked_until = Some(until);
            state.count = 0;
            state.window_start = None;
            tracing::warn!(key, %until, "Login attempts exhausted, key blocked");
            return AttemptVerdict::Blocked { until };
        }
        AttemptVerdict::Allowed {
            remaining: self.max_attempts - state.count,
        }
    }

    /// Forget a key after a successful login
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// Drop keys with no live block and no attempts inside the window at
    /// `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.attempts.len();
        self.attempts.retain(|_, state| state.is_live(now, self.window));
        before - self.attempts.len()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
