//! src/services/descriptor_cache.rs
//!
//! DescriptorCache — rendered menus kept for a fixed time-to-live.
//!
//! Entries are `key -> (value, expiry)`. Time comes from an injected `Clock`
//! so expiry can be driven by hand in tests.

use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Menus are rebuilt at most once a day.
pub const DEFAULT_MENU_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct DescriptorCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl DescriptorCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached value, unless it has expired. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let fresh = entries
            .get(key)
            .map(|(value, expires)| (now < *expires).then(|| value.clone()));
        match fresh {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` until `ttl` from now, evicting whatever has expired.
    pub fn insert(&self, key: impl Into<String>, value: String) {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, expires)| now < *expires);
        entries.insert(key.into(), (value, now + self.ttl));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }
}
