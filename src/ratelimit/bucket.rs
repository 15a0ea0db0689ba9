use std::time::Duration;
use tokio::time::Instant;

/// Tolerance for float drift after sleeping exactly the computed refill time
const TOKEN_EPSILON: f64 = 1e-9;

/// A continuously refilling token bucket
///
/// Refill is computed lazily from elapsed time whenever the bucket is
/// inspected; no timer runs in the background. The token count never exceeds
/// the capacity.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(refill_rate: f64, capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
        }
    }

    /// Creates a full bucket whose burst capacity matches its rate (at least one)
    pub fn with_rate(refill_rate: f64, now: Instant) -> Self {
        Self::new(refill_rate, refill_rate.max(1.0), now)
    }

    /// Adds the tokens accrued since the last refill
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Whether a whole token is available (call `refill` first)
    pub fn has_token(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= 1.0
    }

    /// Consumes one token; callers check `has_token` beforehand
    pub fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Time until one whole token will be available
    pub fn time_until_token(&self) -> Duration {
        if self.has_token() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
