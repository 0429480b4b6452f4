//! Time abstraction for the polling loop
//!
//! The scheduler only ever waits through a [`TimeProvider`], so tests can swap
//! in [`VirtualTimeProvider`](crate::infra::testing::time::VirtualTimeProvider)
//! and drive ticks without wall-clock delays.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Boxed sleep future returned by [`TimeProvider::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Trait for providing time in tests and production
pub trait TimeProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Get the current instant
    fn now(&self) -> Instant;

    /// Get the current UTC datetime
    fn utc_now(&self) -> DateTime<Utc>;

    /// Sleep for a duration (in tests, this waits for virtual time)
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Production time provider backed by tokio timers
#[derive(Clone, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
