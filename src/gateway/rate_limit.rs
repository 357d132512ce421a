//! Weighted token bucket shared by every request an adapter makes.

use super::GatewayError;
use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Share of the published exchange budget we allow ourselves to use.
const SAFETY_MARGIN: f64 = 0.90;

/// Spends request weight against an exchange budget and honours ban pauses.
pub struct RequestBudget {
    limiter: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    capacity: u32,
    paused_until: Mutex<Option<Instant>>,
}

impl RequestBudget {
    /// `limit` weight units per `period`, reduced by the safety margin.
    pub fn new(limit: u32, period: Duration) -> Self {
        let capacity = ((limit as f64 * SAFETY_MARGIN) as u32).max(1);
        let burst = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
        let replenish = period / capacity;
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            limiter: GovernorRateLimiter::direct(quota),
            capacity,
            paused_until: Mutex::new(None),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Waits until `weight` units are available (and any pause has elapsed).
    pub async fn acquire(&self, weight: u32) -> Result<(), GatewayError> {
        let n = NonZeroU32::new(weight).unwrap_or(NonZeroU32::MIN);

        while let Some(until) = self.pause_deadline() {
            tokio::time::sleep_until(until).await;
        }

        self.limiter
            .until_n_ready(n)
            .await
            .map_err(|_| GatewayError::InsufficientCapacity { weight })
    }

    /// Holds back every caller for `duration`. Overlapping pauses keep the later deadline.
    pub fn pause_for(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut paused = self.paused_until.lock().unwrap_or_else(|e| e.into_inner());
        if paused.is_none_or(|current| current < until) {
            warn!(secs = duration.as_secs(), "pausing requests to respect the exchange rate limit");
            *paused = Some(until);
        }
    }

    fn pause_deadline(&self) -> Option<Instant> {
        let mut paused = self.paused_until.lock().unwrap_or_else(|e| e.into_inner());
        match *paused {
            Some(until) if until > Instant::now() => Some(until),
            Some(_) => {
                *paused = None;
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_keeps_a_safety_margin() {
        assert_eq!(RequestBudget::per_minute(6000).capacity(), 5400);
        assert_eq!(RequestBudget::new(200, Duration::from_secs(10)).capacity(), 180);
        assert_eq!(RequestBudget::per_minute(0).capacity(), 1);
    }

    #[tokio::test]
    async fn acquire_within_burst_is_immediate() {
        let budget = RequestBudget::per_minute(100);
        for _ in 0..10 {
            budget.acquire(2).await.unwrap();
        }
    }

    #[tokio::test]
    async fn oversized_weight_is_rejected() {
        let budget = RequestBudget::per_minute(10);
        assert_eq!(
            budget.acquire(50).await,
            Err(GatewayError::InsufficientCapacity { weight: 50 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pause_delays_the_next_request() {
        let budget = RequestBudget::per_minute(100);
        budget.pause_for(Duration::from_secs(30));
        let start = Instant::now();
        budget.acquire(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_pause_does_not_shorten_a_longer_one() {
        let budget = RequestBudget::per_minute(100);
        budget.pause_for(Duration::from_secs(60));
        budget.pause_for(Duration::from_secs(5));
        let start = Instant::now();
        budget.acquire(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
