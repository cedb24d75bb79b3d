use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget for the terminal gateway.
///
/// A call beyond the budget waits until a cell frees up instead of failing,
/// so long serial batches (one series call per fund) always finish.
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
    waiting: Arc<AtomicUsize>,
    limit: u32,
    window: Duration,
}

impl Throttle {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(window, limit))),
            waiting: Arc::new(AtomicUsize::new(0)),
            limit: limit.max(1),
            window,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(Duration::from_secs(60), limit)
    }

    /// Takes one unit of budget, waiting for the quota to replenish if needed.
    pub async fn acquire(&self) {
        if self.limiter.check().is_ok() {
            return;
        }

        let queued = self.waiting.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            limit = self.limit,
            window_ms = self.window.as_millis() as u64,
            queued,
            "gateway request budget spent; waiting"
        );
        self.limiter.until_ready().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    /// Requests currently parked in [`acquire`](Self::acquire).
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("waiting", &self.waiting())
            .finish()
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
