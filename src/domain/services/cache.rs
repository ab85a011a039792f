//! TTL-keyed cache (spec §4.3): `Get`/`Set` with a per-entry expiry, lazy
//! eviction on `Get`, safe under concurrent callers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(180);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value if present and not expired. An expired entry
    /// is evicted on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// `ttl == Duration::ZERO` falls back to `DEFAULT_TTL`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.lock().expect("cache mutex poisoned").remove(key);
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn price_key(symbol: &str) -> String {
    format!("price_{symbol}")
}

pub fn indicators_key(symbol: &str, timeframe: &str) -> String {
    format!("indicators_{symbol}_{timeframe}")
}

pub const PRICE_TTL: Duration = Duration::from_secs(5);
pub const INDICATORS_TTL: Duration = Duration::from_secs(180);

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn set_then_get_returns_value() {
        let cache: TtlCache<f64> = TtlCache::new();
        cache.set(price_key("BTC/USDT"), 65000.0, PRICE_TTL);
        assert_eq!(cache.get(&price_key("BTC/USDT")), Some(65000.0));
    }

    #[test]
    fn missing_key_is_none() {
        let cache: TtlCache<f64> = TtlCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn expired_entry_is_evicted_lazily() {
        let cache: TtlCache<f64> = TtlCache::new();
        cache.set("k", 1.0, Duration::from_millis(5));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn zero_ttl_uses_default() {
        let cache: TtlCache<f64> = TtlCache::new();
        cache.set("k", 1.0, Duration::ZERO);
        assert_eq!(cache.get("k"), Some(1.0));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache: TtlCache<f64> = TtlCache::new();
        cache.set("k", 1.0, PRICE_TTL);
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }
}
