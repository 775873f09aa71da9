//! Wall-clock sources.
//!
//! Latency is derived from two readings of the wall clock taken on different
//! hosts: the sender's at encode time and the receiver's at decode time.
//! Both sides are assumed to share a time reference; nothing here attempts
//! to synchronise them.
//!
//! - [`SystemClock`]: the real clock, used by the binary.
//! - [`ManualClock`]: a scripted clock that advances by a fixed step on
//!   every reading, for deterministic latency figures in tests.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of timestamps in floating-point seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Reads [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        // A clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that returns `start`, `start + step`, `start + 2·step`, ...
#[derive(Debug)]
pub struct ManualClock {
    next: Cell<f64>,
    step: f64,
}

impl ManualClock {
    pub fn new(start: f64, step: f64) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        let t = self.next.get();
        self.next.set(t + self.step);
        t
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
