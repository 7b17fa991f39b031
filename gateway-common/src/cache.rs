//! C3: the process-wide prompt cache (spec.md §4.3, §5). A single
//! concurrent hash map behind one lock; the critical section is an O(1)
//! lookup/insert, with hashing done outside the lock (spec.md §9).

use crate::clock::Clock;
use bridge_core::fingerprint::Fingerprint;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct CacheAccess {
    pub hit: bool,
    pub first_seen: bool,
    /// Tokens attributed to this fingerprint, estimated on first insertion
    /// and echoed back as `cache_read_input_tokens` on every later hit.
    pub tokens: u32,
}

struct Entry {
    tokens: u32,
    last_access_ms: u64,
}

/// Bounded by a TTL (lazily swept on access) and a soft entry cap, evicted
/// LRU on reaching the cap.
pub struct PromptCache {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    ttl_ms: u64,
    soft_cap: usize,
    clock: Arc<dyn Clock>,
}

impl PromptCache {
    pub fn new(ttl_ms: u64, soft_cap: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms,
            soft_cap,
            clock,
        }
    }

    /// Records an access for `fingerprint`, estimating `tokens` if this is
    /// the first time it is seen. Returns whether it was a hit and the
    /// token count to attribute.
    pub fn record_access(&self, fingerprint: &Fingerprint, estimated_tokens: u32) -> CacheAccess {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().expect("prompt cache lock poisoned");

        self.sweep_expired_locked(&mut entries, now);

        if let Some(entry) = entries.get_mut(fingerprint) {
            entry.last_access_ms = now;
            return CacheAccess {
                hit: true,
                first_seen: false,
                tokens: entry.tokens,
            };
        }

        if entries.len() >= self.soft_cap {
            self.evict_lru_locked(&mut entries);
        }

        entries.insert(
            fingerprint.clone(),
            Entry {
                tokens: estimated_tokens,
                last_access_ms: now,
            },
        );

        CacheAccess {
            hit: false,
            first_seen: true,
            tokens: estimated_tokens,
        }
    }

    fn sweep_expired_locked(&self, entries: &mut HashMap<Fingerprint, Entry>, now: u64) {
        entries.retain(|_, entry| now.saturating_sub(entry.last_access_ms) < self.ttl_ms);
    }

    fn evict_lru_locked(&self, entries: &mut HashMap<Fingerprint, Entry>) {
        if let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access_ms)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("prompt cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
