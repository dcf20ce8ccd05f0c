//! Injectable time source for the scheduler.
//!
//! Production uses [`SystemClock`]; tests drive the loop with a clock that
//! jumps straight to the requested instant instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend until `instant`.  Must return immediately when the instant is
    /// already in the past.
    async fn sleep_until(&self, instant: DateTime<Utc>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, instant: DateTime<Utc>) {
        let now = Utc::now();
        if instant > now {
            let wait = (instant - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
    }
}
