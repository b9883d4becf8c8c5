// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-client request limiting.
//!
//! Each client key gets a GCRA bucket that admits `limit` requests per
//! `window`, all of which may arrive as a burst. Keys whose bucket has fully
//! refilled carry no state and are dropped by the sweeper.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between sweeps of idle client keys.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A rejected request: how long until the client may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttled {
    pub wait: Duration,
}

impl Throttled {
    /// Whole seconds until the next request is admitted, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        (self.wait.as_millis().div_ceil(1000) as u64).max(1)
    }
}

/// Keyed limiter for client addresses.
pub struct RateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    clock: DefaultClock,
}

impl RateLimiter {
    /// Admit `limit` requests per `window` for each key.
    pub fn new(limit: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        let replenish = (window / burst.get()).max(Duration::from_millis(1));
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_minute(burst))
            .allow_burst(burst);
        Self {
            limiter: governor::RateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), Throttled> {
        self.limiter
            .check_key(&key.to_string())
            .map_err(|not_until| Throttled {
                wait: not_until.wait_time_from(self.clock.now()),
            })
    }

    /// Forget keys whose bucket has refilled. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        before.saturating_sub(self.limiter.len())
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }

    /// Sweep every [`SWEEP_INTERVAL`] until cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = this.sweep();
                        if removed > 0 {
                            debug!(removed, "swept idle rate limit keys");
                        }
                    }
                }
            }
        })
    }
}
