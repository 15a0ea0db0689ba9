//! TTL cache for upstream API responses
//!
//! Entries are keyed by request [`Fingerprint`] and expire a fixed time after
//! insertion. Expiry uses wall-clock time so that entries restored from the
//! durable store are judged against the same clock they were written with.

mod fingerprint;
mod store;

pub use fingerprint::Fingerprint;
pub use store::{CacheStore, CacheStoreError, CacheStoreResult, SqliteCacheStore, StoredRecord};

use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A cached value with its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub fingerprint: Fingerprint,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe response cache with an optional durable store
pub struct ResponseCache<V> {
    entries: Mutex<HashMap<Fingerprint, CacheEntry<V>>>,
    ttl: chrono::Duration,
    store: Option<Box<dyn CacheStore>>,
}

impl<V> ResponseCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty, memory-only cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: to_chrono(ttl),
            store: None,
        }
    }

    /// Attaches a durable store used by `load_from_store` and `save_to_store`
    pub fn with_store(mut self, store: Box<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the cache described by `[cache]`, backed by SQLite when a path is set
    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new(Duration::from_secs(config.ttl_hours.saturating_mul(3600)));
        match &config.path {
            Some(path) => cache.with_store(Box::new(SqliteCacheStore::new(path))),
            None => cache,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(Duration::ZERO)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<V> {
        self.get_at(fingerprint, Utc::now())
    }

    /// Looks up an entry as of `now`, evicting it if expired
    pub fn get_at(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(fingerprint) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        entries.remove(fingerprint);
        tracing::debug!(fingerprint = %fingerprint, "Evicted expired cache entry");
        None
    }

    /// Inserts a value with the configured TTL
    pub fn put(&self, fingerprint: Fingerprint, value: V) {
        self.insert(fingerprint, value, Utc::now(), self.ttl);
    }

    /// Inserts a value with an explicit TTL
    pub fn put_with_ttl(&self, fingerprint: Fingerprint, value: V, ttl: Duration) {
        self.insert(fingerprint, value, Utc::now(), to_chrono(ttl));
    }

    /// Removes an entry, returning whether one existed
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().remove(fingerprint).is_some()
    }

    /// Drops every entry expired as of `now`
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Restores entries from the durable store
    ///
    /// Records that fail to parse or have already expired are dropped. An
    /// unreadable store is logged and leaves the cache empty.
    ///
    /// # Returns
    ///
    /// The number of entries restored
    pub fn load_from_store(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let records = match store.load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Cache store unreadable, starting empty: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let total = records.len();
        let mut restored = 0;
        let mut entries = self.lock();
        for record in records {
            if let Some(entry) = decode_record::<V>(&record) {
                if !entry.is_expired_at(now) {
                    entries.insert(entry.fingerprint.clone(), entry);
                    restored += 1;
                }
            }
        }

        tracing::info!(restored, dropped = total - restored, "Loaded response cache");
        restored
    }

    /// Writes every live entry to the durable store
    ///
    /// # Returns
    ///
    /// The number of entries written, or the store error
    pub fn save_to_store(&self) -> CacheStoreResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let now = Utc::now();
        let records = {
            let entries = self.lock();
            entries
                .values()
                .filter(|entry| !entry.is_expired_at(now))
                .map(encode_record)
                .collect::<CacheStoreResult<Vec<_>>>()?
        };

        store.save(&records)?;
        tracing::info!(saved = records.len(), "Saved response cache");
        Ok(records.len())
    }

    fn insert(
        &self,
        fingerprint: Fingerprint,
        value: V,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            value,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.lock().insert(fingerprint, entry);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650))
}

fn encode_record<V: Serialize>(entry: &CacheEntry<V>) -> CacheStoreResult<StoredRecord> {
    Ok(StoredRecord {
        fingerprint: entry.fingerprint.as_str().to_string(),
        value: serde_json::to_string(&entry.value)?,
        created_at: entry.created_at.to_rfc3339(),
        expires_at: entry.expires_at.to_rfc3339(),
    })
}

fn decode_record<V: DeserializeOwned>(record: &StoredRecord) -> Option<CacheEntry<V>> {
    let value = serde_json::from_str(&record.value).ok()?;
    let created_at = DateTime::parse_from_rfc3339(&record.created_at).ok()?;
    let expires_at = DateTime::parse_from_rfc3339(&record.expires_at).ok()?;
    Some(CacheEntry {
        fingerprint: Fingerprint::from_hex(record.fingerprint.clone()),
        value,
        created_at: created_at.with_timezone(&Utc),
        expires_at: expires_at.with_timezone(&Utc),
    })
}
