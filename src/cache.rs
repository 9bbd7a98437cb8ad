// ⏳ TTL Cache - single global entry, refreshed wholesale on expiry
//
// The spreadsheet is slow and rate limited, and it changes rarely, so a
// successful load is reused until it is `ttl` old. The clock is injected
// so expiry is testable without sleeping.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CLOCK
// ============================================================================

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// CACHE
// ============================================================================

struct CacheEntry<T> {
    value: Arc<T>,
    fetched_at: DateTime<Utc>,
}

pub struct TtlCache<T> {
    clock: Box<dyn Clock>,
    entry: Option<CacheEntry<T>>,
}

impl<T> TtlCache<T> {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        TtlCache { clock, entry: None }
    }

    /// Age of the cached value, if any
    pub fn age(&self) -> Option<chrono::Duration> {
        self.entry
            .as_ref()
            .map(|e| self.clock.now() - e.fetched_at)
    }

    /// True when a value exists and is younger than `ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            // Longer than chrono can represent: never expires
            Err(_) => return self.entry.is_some(),
        };

        match self.age() {
            Some(age) => age < ttl,
            None => false,
        }
    }

    /// Return the cached value while fresh; otherwise call `fetch`.
    ///
    /// A successful fetch replaces the entry. A failed fetch is returned to
    /// the caller and leaves the previous entry untouched (it is not served).
    pub fn get_or_fetch<E>(
        &mut self,
        ttl: Duration,
        fetch: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        if self.is_fresh(ttl) {
            if let Some(entry) = &self.entry {
                return Ok(Arc::clone(&entry.value));
            }
        }

        let value = Arc::new(fetch()?);
        self.entry = Some(CacheEntry {
            value: Arc::clone(&value),
            fetched_at: self.clock.now(),
        });
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
