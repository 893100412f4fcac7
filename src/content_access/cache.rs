use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::model::ContentAccessCertificate;

/// Cache key of an anonymous certificate: hex SHA-256 over the owner key and
/// the owner's content version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    pub fn new(owner_key: &str, content_version: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(owner_key.as_bytes());
        hasher.update([0u8]);
        hasher.update(content_version.to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct CacheEntry {
    owner_key: String,
    content_version: u64,
    certificate: ContentAccessCertificate,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheFingerprint, CacheEntry>,
    lru: VecDeque<CacheFingerprint>,
}

/// Bounded LRU cache of certificates issued to anonymous consumers.
///
/// Entries expire after the configured TTL or when their certificate's
/// serial expires, whichever comes first.
pub struct AnonymousCertificateCache {
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
    fill_locks: DashMap<CacheFingerprint, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AnonymousCertificateCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            state: Mutex::new(CacheState::default()),
            fill_locks: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a live entry, counting the hit or miss.
    pub fn get(&self, fingerprint: &CacheFingerprint, now: OffsetDateTime) -> Option<ContentAccessCertificate> {
        let found = self.peek(fingerprint, now);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Like [`get`](Self::get) without touching the statistics.
    pub fn peek(&self, fingerprint: &CacheFingerprint, now: OffsetDateTime) -> Option<ContentAccessCertificate> {
        let mut state = self.state();
        let expired = match state.entries.get(fingerprint) {
            None => return None,
            Some(entry) => entry.expires_at <= now,
        };
        if expired {
            debug!(%fingerprint, "dropping expired anonymous certificate");
            remove_entry(&mut state, fingerprint);
            return None;
        }
        touch_lru(&mut state.lru, fingerprint);
        state
            .entries
            .get(fingerprint)
            .map(|entry| entry.certificate.clone())
    }

    /// Caches `certificate`. Entries of the same owner built from an older
    /// content version are dropped, and the least recently used entry is
    /// evicted when the cache is full.
    pub fn insert(
        &self,
        fingerprint: CacheFingerprint,
        owner_key: &str,
        content_version: u64,
        certificate: ContentAccessCertificate,
        now: OffsetDateTime,
    ) {
        if !self.is_enabled() {
            return;
        }

        let expires_at = now
            .checked_add(self.ttl)
            .map_or(certificate.serial.expiration, |ttl_end| {
                ttl_end.min(certificate.serial.expiration)
            });
        let mut state = self.state();

        let stale: Vec<CacheFingerprint> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.owner_key == owner_key && entry.content_version < content_version)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            remove_entry(&mut state, key);
        }

        if !state.entries.contains_key(&fingerprint) && state.entries.len() >= self.capacity {
            if let Some(oldest) = state.lru.pop_front() {
                state.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %oldest, "evicted least recently used anonymous certificate");
            }
        }

        state.entries.insert(
            fingerprint.clone(),
            CacheEntry {
                owner_key: owner_key.to_string(),
                content_version,
                certificate,
                expires_at,
            },
        );
        touch_lru(&mut state.lru, &fingerprint);
    }

    pub fn invalidate(&self, fingerprint: &CacheFingerprint) -> bool {
        remove_entry(&mut self.state(), fingerprint)
    }

    /// Drops every entry of `owner_key`; returns how many were removed.
    pub fn invalidate_owner(&self, owner_key: &str) -> usize {
        let mut state = self.state();
        let doomed: Vec<CacheFingerprint> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.owner_key == owner_key)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            remove_entry(&mut state, key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// The lock serializing fills of `fingerprint`.
    pub fn fill_lock(&self, fingerprint: &CacheFingerprint) -> Arc<Mutex<()>> {
        self.fill_locks.entry(fingerprint.clone()).or_default().clone()
    }

    /// Forgets the fill lock of `fingerprint` once no caller holds it.
    pub fn release_fill_lock(&self, fingerprint: &CacheFingerprint) {
        self.fill_locks
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn touch_lru(lru: &mut VecDeque<CacheFingerprint>, key: &CacheFingerprint) {
    if let Some(position) = lru.iter().position(|entry| entry == key) {
        lru.remove(position);
    }
    lru.push_back(key.clone());
}

fn remove_entry(state: &mut CacheState, key: &CacheFingerprint) -> bool {
    if let Some(position) = state.lru.iter().position(|entry| entry == key) {
        state.lru.remove(position);
    }
    state.entries.remove(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_depends_on_owner_and_version() {
        let base = CacheFingerprint::new("acme", 1);
        assert_eq!(base, CacheFingerprint::new("acme", 1));
        assert_ne!(base, CacheFingerprint::new("acme", 2));
        assert_ne!(base, CacheFingerprint::new("acme2", 1));
        assert_eq!(base.as_str().len(), 64);
    }

    #[test]
    fn disabled_cache_stays_empty() {
        let cache = AnonymousCertificateCache::new(0, Duration::hours(1));
        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
        assert!(cache.get(&CacheFingerprint::new("acme", 1), OffsetDateTime::now_utc()).is_none());
        assert_eq!(cache.stats().misses, 1);
    }
}
