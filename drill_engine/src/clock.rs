/// Drill engine: identity and clock capability.
///
/// Every id, timestamp and shuffle seed the kernel needs comes through
/// `IdentityClock`, so tests can run the reducer with fixed values.

use std::cell::Cell;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::Millis;

pub trait IdentityClock {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> Millis;

    /// A fresh unique id.
    fn new_id(&self) -> String;

    /// Seed for the next shuffle. Time-derived unless overridden.
    fn shuffle_seed(&self) -> u64 {
        self.now_ms() as u64
    }
}

impl<T: IdentityClock + ?Sized> IdentityClock for &T {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }

    fn new_id(&self) -> String {
        (**self).new_id()
    }

    fn shuffle_seed(&self) -> u64 {
        (**self).shuffle_seed()
    }
}

impl<T: IdentityClock + ?Sized> IdentityClock for Box<T> {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }

    fn new_id(&self) -> String {
        (**self).new_id()
    }

    fn shuffle_seed(&self) -> u64 {
        (**self).shuffle_seed()
    }
}

/// Wall clock + UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl IdentityClock for SystemClock {
    fn now_ms(&self) -> Millis {
        Utc::now().timestamp_millis()
    }

    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic clock: ids `id-1`, `id-2`, ...; time moves only when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
    next_id: Cell<u64>,
    seed: Cell<Option<u64>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
            next_id: Cell::new(0),
            seed: Cell::new(None),
        }
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set_now(&self, now: Millis) {
        self.now.set(now);
    }

    /// Pin the shuffle seed instead of deriving it from the clock.
    pub fn with_seed(self, seed: u64) -> Self {
        self.seed.set(Some(seed));
        self
    }
}

impl IdentityClock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }

    fn new_id(&self) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("id-{}", n)
    }

    fn shuffle_seed(&self) -> u64 {
        self.seed.get().unwrap_or(self.now.get() as u64)
    }
}
