#![allow(async_fn_in_trait)]

use embassy_time::{Duration, Instant};

/// Monotonic time source and the only way the control loop waits.
///
/// Every bounded wait in the crate is a poll loop against a deadline taken
/// from [`Clock::now`], suspended with [`Clock::sleep`]. Tests substitute a
/// manual clock to step through timeouts without real delays.
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep(&mut self, duration: Duration);

    fn elapsed_since(&self, start: Instant) -> Duration {
        self.now().saturating_duration_since(start)
    }
}

/// Clock backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&mut self, duration: Duration) {
        embassy_time::Timer::after(duration).await;
    }
}
