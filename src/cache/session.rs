//! In-memory cache that lives for one session.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::traits::QueryKey;

struct Slot<V> {
  value: V,
  stored_at: Instant,
}

/// Query results kept in memory until the session ends or a mutation
/// clears them.
///
/// Nothing is persisted and failed fetches are never stored.
pub struct SessionCache<V> {
  entries: Mutex<HashMap<String, Slot<V>>>,
  ttl: Option<Duration>,
}

impl<V: Clone> SessionCache<V> {
  /// Entries stay valid until [`clear`](Self::clear).
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl: None,
    }
  }

  /// Entries expire `ttl` after they were stored.
  pub fn with_ttl(ttl: Duration) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl: Some(ttl),
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, Slot<V>>> {
    // A panic while holding the lock cannot leave a half-written slot
    self.entries.lock().unwrap_or_else(|p| p.into_inner())
  }

  fn is_fresh(&self, slot: &Slot<V>) -> bool {
    self.ttl.map_or(true, |ttl| slot.stored_at.elapsed() < ttl)
  }

  pub fn get(&self, key: &impl QueryKey) -> Option<V> {
    let mut entries = self.entries();
    let hash = key.cache_hash();
    match entries.get(&hash) {
      Some(slot) if self.is_fresh(slot) => Some(slot.value.clone()),
      Some(_) => {
        entries.remove(&hash);
        None
      }
      None => None,
    }
  }

  pub fn insert(&self, key: &impl QueryKey, value: V) {
    self.entries().insert(
      key.cache_hash(),
      Slot {
        value,
        stored_at: Instant::now(),
      },
    );
  }

  /// Return the cached value for `key` or fetch and store it.
  ///
  /// The lock is not held across the fetch; two concurrent misses both fetch.
  pub async fn get_or_fetch<K, F, Fut, E>(&self, key: &K, fetch: F) -> Result<V, E>
  where
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, E>>,
  {
    if let Some(value) = self.get(key) {
      debug!(query = %key.description(), "session cache hit");
      return Ok(value);
    }

    let value = fetch().await?;
    self.insert(key, value.clone());
    Ok(value)
  }

  /// Drop every entry. Returns how many were removed.
  pub fn clear(&self) -> usize {
    let mut entries = self.entries();
    let removed = entries.len();
    entries.clear();
    removed
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<V: Clone> Default for SessionCache<V> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Page(u32, &'static str);

  impl QueryKey for Page {
    fn description(&self) -> String {
      format!("{}_{}", self.0, self.1)
    }
  }

  #[tokio::test]
  async fn test_get_or_fetch_caches_success() {
    let cache = SessionCache::new();
    let first = cache
      .get_or_fetch(&Page(1, ""), || async { Ok::<_, String>(vec![1, 2]) })
      .await
      .unwrap();
    assert_eq!(first, vec![1, 2]);

    let second = cache
      .get_or_fetch(&Page(1, ""), || async { Err::<Vec<i32>, _>("should not fetch".to_string()) })
      .await
      .unwrap();
    assert_eq!(second, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_errors_are_not_cached() {
    let cache: SessionCache<u32> = SessionCache::new();
    let err = cache
      .get_or_fetch(&Page(1, "ana"), || async { Err::<u32, _>("down") })
      .await
      .unwrap_err();
    assert_eq!(err, "down");
    assert!(cache.is_empty());

    let value = cache
      .get_or_fetch(&Page(1, "ana"), || async { Ok::<_, &str>(3) })
      .await
      .unwrap();
    assert_eq!(value, 3);
  }

  #[test]
  fn test_keys_are_distinct() {
    let cache = SessionCache::new();
    cache.insert(&Page(1, ""), "page one");
    cache.insert(&Page(2, ""), "page two");
    assert_eq!(cache.get(&Page(1, "")), Some("page one"));
    assert_eq!(cache.get(&Page(1, "x")), None);
    assert_eq!(cache.len(), 2);
  }

  #[test]
  fn test_clear_drops_everything() {
    let cache = SessionCache::new();
    cache.insert(&Page(1, ""), 1);
    cache.insert(&Page(2, ""), 2);
    assert_eq!(cache.clear(), 2);
    assert!(cache.get(&Page(1, "")).is_none());
  }

  #[test]
  fn test_ttl_expiry() {
    let cache = SessionCache::with_ttl(Duration::ZERO);
    cache.insert(&Page(1, ""), 1);
    assert_eq!(cache.get(&Page(1, "")), None);
    assert!(cache.is_empty());

    let cache = SessionCache::with_ttl(Duration::from_secs(60));
    cache.insert(&Page(1, ""), 1);
    assert_eq!(cache.get(&Page(1, "")), Some(1));
  }
}
