//! Sliding-window pacing for outbound lookups.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::info;

use crate::error::{Error, Result};

/// Requests allowed by ip-api.com's free endpoint per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 45;
/// Length of ip-api.com's rate window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// At most `max_requests` requests in any `window`-long interval.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        RatePolicy {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RatePolicy {
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(Error::InvalidRatePolicy {
                reason: "max requests per window must be at least 1".to_string(),
            });
        }
        if window.is_zero() {
            return Err(Error::InvalidRatePolicy {
                reason: "window must be longer than zero".to_string(),
            });
        }
        Ok(RatePolicy {
            max_requests,
            window,
        })
    }
}

/// Source of time for a [`Throttle`].
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Blocks callers so that a [`RatePolicy`] is never exceeded.
#[derive(Debug)]
pub struct Throttle<C = SystemClock> {
    policy: RatePolicy,
    clock: C,
    sent: VecDeque<Instant>,
}

impl Throttle<SystemClock> {
    pub fn new(policy: RatePolicy) -> Self {
        Throttle::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> Throttle<C> {
    pub fn with_clock(policy: RatePolicy, clock: C) -> Self {
        Throttle {
            policy,
            clock,
            sent: VecDeque::with_capacity(policy.max_requests as usize),
        }
    }

    pub fn policy(&self) -> RatePolicy {
        self.policy
    }

    /// How long the next request must wait, given the current time.
    pub fn delay_at(&mut self, now: Instant) -> Option<Duration> {
        while let Some(&oldest) = self.sent.front() {
            if now.saturating_duration_since(oldest) >= self.policy.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
        if self.sent.len() < self.policy.max_requests as usize {
            return None;
        }
        self.sent
            .front()
            .map(|&oldest| (oldest + self.policy.window).saturating_duration_since(now))
            .filter(|d| !d.is_zero())
    }

    /// Wait for a free slot, then claim it.
    ///
    /// Returns the time spent waiting.
    pub fn acquire(&mut self) -> Duration {
        let mut waited = Duration::ZERO;
        while let Some(delay) = self.delay_at(self.clock.now()) {
            info!(
                "Pausing for {:.1}s to stay under {} requests per {}s",
                delay.as_secs_f64(),
                self.policy.max_requests,
                self.policy.window.as_secs()
            );
            self.clock.sleep(delay);
            waited += delay;
        }
        let now = self.clock.now();
        self.sent.push_back(now);
        waited
    }

    /// Sleep for a server-provided back-off.
    pub fn pause(&mut self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        info!(
            "Service asked to back off, pausing for {}s",
            duration.as_secs()
        );
        self.clock.sleep(duration);
        // The server's window restarted, local history no longer applies.
        self.sent.clear();
    }
}
