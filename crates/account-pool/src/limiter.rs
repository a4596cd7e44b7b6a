//! Pool-wide login-rate limiter
//!
//! A rolling counter of login admissions shared by every session in the pool.
//! `try_consume` is a single atomic check-then-increment: a denied attempt
//! does not consume budget. A background task ties the counter reset to the
//! configured window; attempts already admitted when the window resets are
//! not clawed back. Bootstrap logins never pass through the limiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use account_session::LoginBudget;
use tracing::debug;

pub struct LoginLimiter {
    limit: u32,
    recent: AtomicU32,
}

impl LoginLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            recent: AtomicU32::new(0),
        }
    }

    /// Admit one login if the window still has budget.
    pub fn try_consume(&self) -> bool {
        self.recent
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |recent| {
                (recent < self.limit).then_some(recent + 1)
            })
            .is_ok()
    }

    /// Admissions counted in the current window.
    pub fn recent(&self) -> u32 {
        self.recent.load(Ordering::Acquire)
    }

    /// Start a fresh window.
    pub fn reset(&self) {
        self.recent.store(0, Ordering::Release);
    }
}

impl LoginBudget for LoginLimiter {
    fn try_consume(&self) -> bool {
        LoginLimiter::try_consume(self)
    }
}

/// Spawn the background task that resets the limiter every `window`.
///
/// Returns the `JoinHandle` so the pool can abort it on shutdown.
pub fn spawn_reset_task(limiter: Arc<LoginLimiter>, window: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        // Skip the immediate first tick, the counter starts at zero.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let spent = limiter.recent();
            limiter.reset();
            debug!(spent, "login window reset");
        }
    })
}
