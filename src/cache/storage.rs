//! Snapshot backends and the local snapshot store built on them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::StoreError;
use super::traits::{CacheEntry, ResourceKey, TenantId};

/// Raw byte storage keyed by tenant and resource key.
///
/// Every operation is scoped to one tenant. The family column lets a caller
/// drop all parameterized scopes of one resource at once.
pub trait SnapshotBackend: Send + Sync {
  fn load(&self, tenant: &TenantId, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  fn save(&self, tenant: &TenantId, key: &str, family: &str, data: &[u8])
    -> Result<(), StoreError>;

  /// Returns whether an entry existed.
  fn remove(&self, tenant: &TenantId, key: &str) -> Result<bool, StoreError>;

  fn remove_family(&self, tenant: &TenantId, family: &str) -> Result<usize, StoreError>;

  fn remove_tenant(&self, tenant: &TenantId) -> Result<usize, StoreError>;
}

impl<B: SnapshotBackend + ?Sized> SnapshotBackend for Box<B> {
  fn load(&self, tenant: &TenantId, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    (**self).load(tenant, key)
  }

  fn save(
    &self,
    tenant: &TenantId,
    key: &str,
    family: &str,
    data: &[u8],
  ) -> Result<(), StoreError> {
    (**self).save(tenant, key, family, data)
  }

  fn remove(&self, tenant: &TenantId, key: &str) -> Result<bool, StoreError> {
    (**self).remove(tenant, key)
  }

  fn remove_family(&self, tenant: &TenantId, family: &str) -> Result<usize, StoreError> {
    (**self).remove_family(tenant, family)
  }

  fn remove_tenant(&self, tenant: &TenantId) -> Result<usize, StoreError> {
    (**self).remove_tenant(tenant)
  }
}

/// Backend that doesn't store anything.
/// Used when caching is disabled - every read misses.
pub struct NoopBackend;

impl SnapshotBackend for NoopBackend {
  fn load(&self, _tenant: &TenantId, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(None) // Always miss
  }

  fn save(
    &self,
    _tenant: &TenantId,
    _key: &str,
    _family: &str,
    _data: &[u8],
  ) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn remove(&self, _tenant: &TenantId, _key: &str) -> Result<bool, StoreError> {
    Ok(false)
  }

  fn remove_family(&self, _tenant: &TenantId, _family: &str) -> Result<usize, StoreError> {
    Ok(0)
  }

  fn remove_tenant(&self, _tenant: &TenantId) -> Result<usize, StoreError> {
    Ok(0)
  }
}

struct Slot {
  family: String,
  data: Vec<u8>,
}

/// Process-local backend with an optional byte quota shared by all tenants.
#[derive(Default)]
pub struct MemoryBackend {
  slots: RwLock<HashMap<(TenantId, String), Slot>>,
  quota: Option<usize>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject writes once stored payloads would exceed `bytes` in total.
  pub fn with_quota(bytes: usize) -> Self {
    Self {
      slots: RwLock::default(),
      quota: Some(bytes),
    }
  }
}

impl SnapshotBackend for MemoryBackend {
  fn load(&self, tenant: &TenantId, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let slots = self.slots.read().map_err(|_| StoreError::LockPoisoned)?;
    Ok(
      slots
        .get(&(tenant.clone(), key.to_string()))
        .map(|slot| slot.data.clone()),
    )
  }

  fn save(
    &self,
    tenant: &TenantId,
    key: &str,
    family: &str,
    data: &[u8],
  ) -> Result<(), StoreError> {
    let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
    let id = (tenant.clone(), key.to_string());

    if let Some(quota) = self.quota {
      // The slot being replaced does not count against the new write
      let used: usize = slots
        .iter()
        .filter(|(slot_id, _)| **slot_id != id)
        .map(|(_, slot)| slot.data.len())
        .sum();
      let available = quota.saturating_sub(used);
      if data.len() > available {
        return Err(StoreError::QuotaExceeded {
          needed: data.len(),
          available,
        });
      }
    }

    slots.insert(
      id,
      Slot {
        family: family.to_string(),
        data: data.to_vec(),
      },
    );
    Ok(())
  }

  fn remove(&self, tenant: &TenantId, key: &str) -> Result<bool, StoreError> {
    let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
    Ok(slots.remove(&(tenant.clone(), key.to_string())).is_some())
  }

  fn remove_family(&self, tenant: &TenantId, family: &str) -> Result<usize, StoreError> {
    let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
    let before = slots.len();
    slots.retain(|(slot_tenant, _), slot| !(slot_tenant == tenant && slot.family == family));
    Ok(before - slots.len())
  }

  fn remove_tenant(&self, tenant: &TenantId) -> Result<usize, StoreError> {
    let mut slots = self.slots.write().map_err(|_| StoreError::LockPoisoned)?;
    let before = slots.len();
    slots.retain(|(slot_tenant, _), _| slot_tenant != tenant);
    Ok(before - slots.len())
  }
}

/// SQLite-based snapshot backend.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open the database at the default location.
  pub fn open() -> Result<Self, StoreError> {
    Self::open_at(Self::default_path()?)
  }

  /// Open (or create) the database at `path`.
  pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "opened snapshot database");
    Self::with_connection(conn)
  }

  /// Database that lives only as long as this value.
  pub fn in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("lotcache").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(SNAPSHOT_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

/// Schema for the snapshot table.
const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    tenant_id TEXT NOT NULL,
    resource_key TEXT NOT NULL,
    family TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, resource_key)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_family
    ON snapshots(tenant_id, family);
"#;

impl SnapshotBackend for SqliteBackend {
  fn load(&self, tenant: &TenantId, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let conn = self.conn()?;
    let data = conn
      .query_row(
        "SELECT data FROM snapshots WHERE tenant_id = ? AND resource_key = ?",
        params![tenant.as_str(), key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(data)
  }

  fn save(
    &self,
    tenant: &TenantId,
    key: &str,
    family: &str,
    data: &[u8],
  ) -> Result<(), StoreError> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR REPLACE INTO snapshots (tenant_id, resource_key, family, data, stored_at)
       VALUES (?, ?, ?, ?, ?)",
      params![tenant.as_str(), key, family, data, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  fn remove(&self, tenant: &TenantId, key: &str) -> Result<bool, StoreError> {
    let conn = self.conn()?;
    let removed = conn.execute(
      "DELETE FROM snapshots WHERE tenant_id = ? AND resource_key = ?",
      params![tenant.as_str(), key],
    )?;
    Ok(removed > 0)
  }

  fn remove_family(&self, tenant: &TenantId, family: &str) -> Result<usize, StoreError> {
    let conn = self.conn()?;
    let removed = conn.execute(
      "DELETE FROM snapshots WHERE tenant_id = ? AND family = ?",
      params![tenant.as_str(), family],
    )?;
    Ok(removed)
  }

  fn remove_tenant(&self, tenant: &TenantId) -> Result<usize, StoreError> {
    let conn = self.conn()?;
    let removed = conn.execute(
      "DELETE FROM snapshots WHERE tenant_id = ?",
      params![tenant.as_str()],
    )?;
    Ok(removed)
  }
}

/// Typed, infallible view over a [`SnapshotBackend`].
///
/// Reads that fail or hit undecodable data count as a miss; failed writes
/// are logged and dropped. Callers never see a [`StoreError`].
pub struct LocalSnapshotStore<B> {
  backend: B,
}

impl<B: SnapshotBackend> LocalSnapshotStore<B> {
  pub fn new(backend: B) -> Self {
    Self { backend }
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn get<T: DeserializeOwned>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
  ) -> Option<CacheEntry<T>> {
    let key = resource.to_string();
    let data = match self.backend.load(tenant, &key) {
      Ok(data) => data?,
      Err(e) => {
        warn!(%tenant, %resource, error = %e, "cache read failed, treating as miss");
        return None;
      }
    };

    match serde_json::from_slice(&data) {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!(%tenant, %resource, error = %e, "corrupt cache entry, treating as miss");
        None
      }
    }
  }

  pub fn set<T: Serialize>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
    entry: &CacheEntry<T>,
  ) {
    let data = match serde_json::to_vec(entry) {
      Ok(data) => data,
      Err(e) => {
        warn!(%tenant, %resource, error = %e, "failed to encode cache entry, not stored");
        return;
      }
    };

    if let Err(e) = self
      .backend
      .save(tenant, &resource.to_string(), &resource.family(), &data)
    {
      warn!(%tenant, %resource, error = %e, "cache write failed, not stored");
    }
  }

  /// Remove one entry. Returns whether it existed.
  pub fn clear(&self, tenant: &TenantId, resource: &ResourceKey) -> bool {
    self
      .backend
      .remove(tenant, &resource.to_string())
      .unwrap_or_else(|e| {
        warn!(%tenant, %resource, error = %e, "failed to clear cache entry");
        false
      })
  }

  /// Remove every scope of a resource family for one tenant.
  pub fn clear_family(&self, tenant: &TenantId, family: &str) -> usize {
    self
      .backend
      .remove_family(tenant, family)
      .unwrap_or_else(|e| {
        warn!(%tenant, family, error = %e, "failed to clear cache family");
        0
      })
  }

  /// Remove every entry of one tenant.
  pub fn clear_all_for_tenant(&self, tenant: &TenantId) -> usize {
    self.backend.remove_tenant(tenant).unwrap_or_else(|e| {
      warn!(%tenant, error = %e, "failed to clear tenant cache");
      0
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::traits::YearMonth;

  fn entry(version: i64, payload: &str) -> CacheEntry<String> {
    CacheEntry::new(Some(version), payload.to_string())
  }

  fn exercise_backend<B: SnapshotBackend>(backend: B) {
    let store = LocalSnapshotStore::new(backend);
    let t1 = TenantId::from("t1");
    let t2 = TenantId::from("t2");

    assert!(store.get::<String>(&t1, &ResourceKey::Vehicles).is_none());

    store.set(&t1, &ResourceKey::Vehicles, &entry(5, "list-a"));
    store.set(&t2, &ResourceKey::Vehicles, &entry(9, "list-b"));

    let got = store.get::<String>(&t1, &ResourceKey::Vehicles).unwrap();
    assert_eq!(got.version, Some(5));
    assert_eq!(got.payload, "list-a");

    // Overwrite keeps a single row
    store.set(&t1, &ResourceKey::Vehicles, &entry(6, "list-c"));
    let got = store.get::<String>(&t1, &ResourceKey::Vehicles).unwrap();
    assert_eq!(got.version, Some(6));

    assert!(store.clear(&t1, &ResourceKey::Vehicles));
    assert!(!store.clear(&t1, &ResourceKey::Vehicles));
    assert!(store.get::<String>(&t1, &ResourceKey::Vehicles).is_none());
    assert_eq!(
      store.get::<String>(&t2, &ResourceKey::Vehicles).unwrap().payload,
      "list-b"
    );
  }

  #[test]
  fn test_memory_backend_roundtrip() {
    exercise_backend(MemoryBackend::new());
  }

  #[test]
  fn test_sqlite_backend_roundtrip() {
    exercise_backend(SqliteBackend::in_memory().unwrap());
  }

  #[test]
  fn test_boxed_backend_roundtrip() {
    let backend: Box<dyn SnapshotBackend> = Box::new(MemoryBackend::new());
    exercise_backend(backend);
  }

  #[test]
  fn test_clear_all_for_tenant_leaves_other_tenants() {
    let store = LocalSnapshotStore::new(SqliteBackend::in_memory().unwrap());
    let t1 = TenantId::from("t1");
    let t2 = TenantId::from("t2");

    store.set(&t1, &ResourceKey::Vehicles, &entry(1, "a"));
    store.set(&t1, &ResourceKey::Banners, &entry(1, "b"));
    store.set(&t2, &ResourceKey::Banners, &entry(1, "c"));

    assert_eq!(store.clear_all_for_tenant(&t1), 2);
    assert!(store.get::<String>(&t1, &ResourceKey::Banners).is_none());
    assert!(store.get::<String>(&t2, &ResourceKey::Banners).is_some());
  }

  #[test]
  fn test_clear_family_removes_every_month() {
    let store = LocalSnapshotStore::new(MemoryBackend::new());
    let tenant = TenantId::from("t1");
    let march = ResourceKey::Dashboard(YearMonth::new(2026, 3).unwrap());
    let april = ResourceKey::Dashboard(YearMonth::new(2026, 4).unwrap());

    store.set(&tenant, &march, &entry(1, "m"));
    store.set(&tenant, &april, &entry(1, "a"));
    store.set(&tenant, &ResourceKey::Stock, &entry(1, "s"));

    assert_eq!(store.clear_family(&tenant, "dashboard"), 2);
    assert!(store.get::<String>(&tenant, &march).is_none());
    assert!(store.get::<String>(&tenant, &ResourceKey::Stock).is_some());
  }

  #[test]
  fn test_custom_keys_use_their_own_slots() {
    let store = LocalSnapshotStore::new(SqliteBackend::in_memory().unwrap());
    let tenant = TenantId::from("t1");
    let march = ResourceKey::Dashboard(YearMonth::new(2026, 3).unwrap());

    store.set(&tenant, &ResourceKey::Vehicles, &entry(1, "real catalog"));
    store.set(&tenant, &march, &entry(1, "real march"));

    let custom_vehicles = ResourceKey::Custom("vehicles".to_string());
    let custom_march = ResourceKey::Custom("dashboard:2026-03".to_string());
    assert!(store.get::<String>(&tenant, &custom_vehicles).is_none());
    assert!(!store.clear(&tenant, &custom_march));
    assert_eq!(store.clear_family(&tenant, &custom_march.family()), 0);

    store.set(&tenant, &custom_vehicles, &entry(2, "mine"));
    assert_eq!(
      store.get::<String>(&tenant, &ResourceKey::Vehicles).unwrap().payload,
      "real catalog"
    );
    assert_eq!(store.get::<String>(&tenant, &march).unwrap().payload, "real march");
  }

  #[test]
  fn test_corrupt_entry_is_a_miss() {
    let store = LocalSnapshotStore::new(SqliteBackend::in_memory().unwrap());
    let tenant = TenantId::from("t1");
    store
      .backend()
      .save(&tenant, "vehicles", "vehicles", b"{not json")
      .unwrap();

    assert!(store.get::<String>(&tenant, &ResourceKey::Vehicles).is_none());

    // A later write replaces the corrupt row
    store.set(&tenant, &ResourceKey::Vehicles, &entry(2, "ok"));
    assert_eq!(
      store.get::<String>(&tenant, &ResourceKey::Vehicles).unwrap().payload,
      "ok"
    );
  }

  #[test]
  fn test_wrong_shape_is_a_miss() {
    let store = LocalSnapshotStore::new(MemoryBackend::new());
    let tenant = TenantId::from("t1");
    store.set(&tenant, &ResourceKey::Home, &entry(1, "text payload"));

    assert!(store.get::<Vec<i64>>(&tenant, &ResourceKey::Home).is_none());
  }

  #[test]
  fn test_quota_exceeded_write_is_swallowed() {
    let store = LocalSnapshotStore::new(MemoryBackend::with_quota(128));
    let tenant = TenantId::from("t1");

    store.set(&tenant, &ResourceKey::Banners, &entry(1, "small"));
    assert!(store.get::<String>(&tenant, &ResourceKey::Banners).is_some());

    let big = "x".repeat(512);
    store.set(&tenant, &ResourceKey::Vehicles, &entry(1, &big));
    assert!(store.get::<String>(&tenant, &ResourceKey::Vehicles).is_none());
  }

  #[test]
  fn test_quota_reports_available_bytes() {
    let backend = MemoryBackend::with_quota(10);
    let tenant = TenantId::from("t1");
    backend.save(&tenant, "a", "a", &[0; 6]).unwrap();

    let err = backend.save(&tenant, "b", "b", &[0; 5]).unwrap_err();
    assert!(matches!(
      err,
      StoreError::QuotaExceeded {
        needed: 5,
        available: 4
      }
    ));

    // Replacing a slot only counts the new size
    backend.save(&tenant, "a", "a", &[0; 10]).unwrap();
  }

  #[test]
  fn test_noop_backend_always_misses() {
    let store = LocalSnapshotStore::new(NoopBackend);
    let tenant = TenantId::from("t1");
    store.set(&tenant, &ResourceKey::Vehicles, &entry(1, "a"));

    assert!(store.get::<String>(&tenant, &ResourceKey::Vehicles).is_none());
    assert!(!store.clear(&tenant, &ResourceKey::Vehicles));
    assert_eq!(store.clear_all_for_tenant(&tenant), 0);
  }

  #[test]
  fn test_sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");
    let tenant = TenantId::from("t1");

    {
      let store = LocalSnapshotStore::new(SqliteBackend::open_at(&path).unwrap());
      store.set(&tenant, &ResourceKey::Stock, &entry(3, "persisted"));
    }

    let store = LocalSnapshotStore::new(SqliteBackend::open_at(&path).unwrap());
    let got = store.get::<String>(&tenant, &ResourceKey::Stock).unwrap();
    assert_eq!(got.version, Some(3));
    assert_eq!(got.payload, "persisted");
  }
}
