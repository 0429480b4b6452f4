//! Virtual time provider for deterministic testing
//!
//! Sleeps created through [`VirtualTimeProvider`] only complete when a test
//! calls [`VirtualTimeProvider::advance`]. Each pending sleep is counted as an
//! armed timer until it fires or is dropped, which lets tests assert how many
//! polling timers are alive.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant, SystemTime};

use crate::infra::time::{Sleep, TimeProvider};

/// Virtual time provider for testing
#[derive(Clone, Debug)]
pub struct VirtualTimeProvider {
    inner: Arc<VirtualClock>,
}

#[derive(Debug)]
struct VirtualClock {
    /// Offset from the base instant
    elapsed: Mutex<Duration>,
    base_instant: Instant,
    base_system_time: SystemTime,
    /// Armed timers keyed by id
    timers: Mutex<Vec<VirtualTimer>>,
    next_timer_id: AtomicU64,
}

/// A virtual timer that can be resolved when time advances
#[derive(Debug)]
struct VirtualTimer {
    id: u64,
    deadline: Instant,
    waker: Waker,
}

impl VirtualTimeProvider {
    /// Create a new virtual time provider
    pub fn new() -> Self {
        Self::new_at(Utc::now())
    }

    /// Create a virtual time provider starting at a specific time
    pub fn new_at(start_time: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(VirtualClock {
                elapsed: Mutex::new(Duration::ZERO),
                base_instant: Instant::now(),
                base_system_time: SystemTime::from(start_time),
                timers: Mutex::new(Vec::new()),
                next_timer_id: AtomicU64::new(0),
            }),
        }
    }

    /// Advance time by a duration, waking every timer that expires
    pub fn advance(&self, duration: Duration) {
        let now = {
            let mut elapsed = self.inner.elapsed.lock();
            *elapsed += duration;
            self.inner.base_instant + *elapsed
        };
        self.wake_expired_timers(now);
    }

    /// Advance time to the next timer deadline
    pub fn advance_to_next_timer(&self) -> Option<Duration> {
        let next = self
            .inner
            .timers
            .lock()
            .iter()
            .map(|timer| timer.deadline)
            .min()?;
        let current = self.now();
        let step = next.saturating_duration_since(current);
        self.advance(step);
        Some(step)
    }

    /// Number of sleeps currently waiting on virtual time
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        *self.inner.elapsed.lock()
    }

    fn wake_expired_timers(&self, now: Instant) {
        let expired: Vec<Waker> = {
            let mut timers = self.inner.timers.lock();
            let mut fired = Vec::new();
            timers.retain(|timer| {
                if timer.deadline <= now {
                    fired.push(timer.waker.clone());
                    false
                } else {
                    true
                }
            });
            fired
        };
        // Wake outside the lock; a woken task may immediately re-arm.
        for waker in expired {
            waker.wake();
        }
    }

    fn register(&self, id: u64, deadline: Instant, waker: &Waker) {
        let mut timers = self.inner.timers.lock();
        match timers.iter_mut().find(|timer| timer.id == id) {
            Some(timer) => timer.waker.clone_from(waker),
            None => timers.push(VirtualTimer {
                id,
                deadline,
                waker: waker.clone(),
            }),
        }
    }

    fn unregister(&self, id: u64) {
        self.inner.timers.lock().retain(|timer| timer.id != id);
    }
}

impl Default for VirtualTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for VirtualTimeProvider {
    fn now(&self) -> Instant {
        self.inner.base_instant + *self.inner.elapsed.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let elapsed = *self.inner.elapsed.lock();
        (self.inner.base_system_time + elapsed).into()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(VirtualSleep::new(self, duration))
    }
}

/// Future that completes when virtual time advances past a deadline
struct VirtualSleep {
    provider: VirtualTimeProvider,
    id: u64,
    deadline: Instant,
}

impl VirtualSleep {
    fn new(provider: &VirtualTimeProvider, duration: Duration) -> Self {
        let id = provider.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        Self {
            provider: provider.clone(),
            id,
            deadline: provider.now() + duration,
        }
    }
}

impl std::future::Future for VirtualSleep {
    type Output = ();

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        if self.provider.now() >= self.deadline {
            self.provider.unregister(self.id);
            Poll::Ready(())
        } else {
            self.provider.register(self.id, self.deadline, cx.waker());
            Poll::Pending
        }
    }
}

impl Drop for VirtualSleep {
    fn drop(&mut self) {
        self.provider.unregister(self.id);
    }
}
