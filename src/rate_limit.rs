//! Pacing for calls to external services.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::generation::GenerationError;

pub trait RateLimiter {
    /// Blocks until the next call is permitted.
    fn acquire(&mut self);

    /// Pushes the next permit at least `wait` into the future.
    fn penalize(&mut self, wait: Duration);
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        let wait = deadline - now;
        debug!("Rate limiting: waiting {wait:?}");
        thread::sleep(wait);
    }
}

/// Enforces a minimum interval between consecutive permits.
#[derive(Debug)]
pub struct IntervalLimiter {
    min_interval: Duration,
    next_permit: Option<Instant>,
}

impl IntervalLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_permit: None,
        }
    }
}

impl RateLimiter for IntervalLimiter {
    fn acquire(&mut self) {
        if let Some(deadline) = self.next_permit {
            sleep_until(deadline);
        }
        self.next_permit = Some(Instant::now() + self.min_interval);
    }

    fn penalize(&mut self, wait: Duration) {
        let deadline = Instant::now() + wait;
        self.next_permit = Some(self.next_permit.map_or(deadline, |next| next.max(deadline)));
    }
}

/// Token bucket refilled at `per_minute` tokens per minute, holding at most
/// `burst` tokens. Starts full.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

impl TokenBucket {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: f64::from(per_minute.max(1)) / 60.0,
            last_refill: Instant::now(),
            blocked_until: None,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}

impl RateLimiter for TokenBucket {
    fn acquire(&mut self) {
        if let Some(deadline) = self.blocked_until.take() {
            sleep_until(deadline);
        }
        self.refill();
        if self.tokens < 1.0 {
            let missing = 1.0 - self.tokens;
            sleep_until(Instant::now() + Duration::from_secs_f64(missing / self.refill_per_sec));
            self.refill();
        }
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    fn penalize(&mut self, wait: Duration) {
        let deadline = Instant::now() + wait;
        self.blocked_until = Some(self.blocked_until.map_or(deadline, |b| b.max(deadline)));
        self.tokens = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th rate-limited attempt when the service gave
    /// no `Retry-After`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `call` once per permit from `limiter`. Rate-limited attempts are
/// retried up to `policy.max_attempts`; any other error is returned as is.
/// A service-supplied wait never exceeds `policy.max_delay`.
pub fn call_with_retry<T, L, F>(
    limiter: &mut L,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, GenerationError>
where
    L: RateLimiter + ?Sized,
    F: FnMut() -> Result<T, GenerationError>,
{
    let mut attempt = 1;
    loop {
        limiter.acquire();
        match call() {
            Err(GenerationError::RateLimited { retry_after }) if attempt < policy.max_attempts => {
                let wait = retry_after
                    .map_or_else(|| policy.backoff(attempt), |wait| wait.min(policy.max_delay));
                warn!(
                    "Rate limit hit (attempt {attempt}/{}), waiting {wait:?}",
                    policy.max_attempts
                );
                limiter.penalize(wait);
                attempt += 1;
            }
            result => return result,
        }
    }
}
