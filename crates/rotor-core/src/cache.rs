//! Time-invalidated in-memory cache for monitor status values.

use std::time::{Duration, Instant};

/// A single cached value with the instant it was computed.
///
/// Freshness is decided purely by elapsed wall-clock time; nothing else
/// invalidates an entry short of [`CachedValue::invalidate`].
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    entry: Option<(T, Instant)>,
    ttl: Duration,
}

impl<T: Clone> CachedValue<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Value if it is younger than the default ttl.
    pub fn get(&self) -> Option<&T> {
        self.get_within(self.ttl)
    }

    /// Value if it is younger than `max_age`.
    pub fn get_within(&self, max_age: Duration) -> Option<&T> {
        match &self.entry {
            Some((value, at)) if at.elapsed() < max_age => Some(value),
            _ => None,
        }
    }

    pub fn set(&mut self, value: T) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Return the cached value when fresh (and `use_cache` is set),
    /// otherwise recompute with `refresh` and store the result.
    pub fn get_or_refresh(
        &mut self,
        use_cache: bool,
        max_age: Duration,
        refresh: impl FnOnce() -> T,
    ) -> T {
        if use_cache && let Some(value) = self.get_within(max_age) {
            return value.clone();
        }
        let value = refresh();
        self.set(value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_misses() {
        let cache: CachedValue<u32> = CachedValue::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_fresh_value_hits() {
        let mut cache = CachedValue::new(Duration::from_secs(60));
        cache.set(7u32);
        assert_eq!(cache.get(), Some(&7));
    }

    #[test]
    fn test_zero_age_always_misses() {
        let mut cache = CachedValue::new(Duration::from_secs(60));
        cache.set(7u32);
        assert!(cache.get_within(Duration::ZERO).is_none());
    }

    #[test]
    fn test_get_or_refresh_uses_cache() {
        let mut cache = CachedValue::new(Duration::from_secs(60));
        let mut calls = 0;
        let first = cache.get_or_refresh(true, Duration::from_secs(60), || {
            calls += 1;
            1u32
        });
        let second = cache.get_or_refresh(true, Duration::from_secs(60), || {
            calls += 1;
            2u32
        });
        assert_eq!((first, second), (1, 1));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_get_or_refresh_bypass_recomputes() {
        let mut cache = CachedValue::new(Duration::from_secs(60));
        cache.set(1u32);
        let value = cache.get_or_refresh(false, Duration::from_secs(60), || 2);
        assert_eq!(value, 2);
        assert_eq!(cache.get(), Some(&2), "bypass still stores the new value");
    }

    #[test]
    fn test_invalidate() {
        let mut cache = CachedValue::new(Duration::from_secs(60));
        cache.set("x".to_string());
        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
