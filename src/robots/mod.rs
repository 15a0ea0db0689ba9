//! Robots.txt handling module
//!
//! Rules are fetched once per origin and cached; entries older than 24 hours
//! are refetched. A fallback verdict taken after a transient failure is kept
//! only for a few minutes. Fetching itself lives in the page fetcher so that robots.txt
//! requests share the same rate limits as page requests.

mod rules;

pub use rules::RobotsRules;

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// How long fetched rules stay fresh
pub const ROBOTS_MAX_AGE_HOURS: i64 = 24;

/// How long an allow-all verdict taken after a transient robots.txt failure is kept
pub const ROBOTS_FALLBACK_MAX_AGE_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
struct CachedRules {
    rules: Arc<RobotsRules>,
    expires_at: DateTime<Utc>,
}

/// Per-origin cache of robots.txt rules
#[derive(Debug)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, CachedRules>>,
    max_age: Duration,
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::with_max_age(Duration::hours(ROBOTS_MAX_AGE_HOURS))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    /// Fresh rules for the origin of `url`, if cached
    pub fn get(&self, url: &Url) -> Option<Arc<RobotsRules>> {
        self.get_at(url, Utc::now())
    }

    pub fn get_at(&self, url: &Url, now: DateTime<Utc>) -> Option<Arc<RobotsRules>> {
        let entries = self.lock();
        entries
            .get(&origin_key(url))
            .filter(|cached| now <= cached.expires_at)
            .map(|cached| cached.rules.clone())
    }

    /// Stores rules for the origin of `url` for the cache's max age
    pub fn insert(&self, url: &Url, rules: RobotsRules) -> Arc<RobotsRules> {
        self.insert_for(url, rules, self.max_age)
    }

    /// Stores rules for the origin of `url`, fresh for `max_age`
    pub fn insert_for(&self, url: &Url, rules: RobotsRules, max_age: Duration) -> Arc<RobotsRules> {
        let rules = Arc::new(rules);
        let now = Utc::now();
        self.lock().insert(
            origin_key(url),
            CachedRules {
                rules: rules.clone(),
                expires_at: now.checked_add_signed(max_age).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        rules
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedRules>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `scheme://host[:port]` of a URL
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Location of the robots.txt governing `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}
