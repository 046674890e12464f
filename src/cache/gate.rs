//! Cache gate that decides between a local snapshot and a remote fetch.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::GateError;
use super::policy::{FreshnessPolicy, VersionPolicy};
use super::storage::{LocalSnapshotStore, SnapshotBackend};
use super::traits::{BoxError, CacheEntry, CacheResult, ResourceKey, TenantId, Version};

/// Read path and invalidation for tenant-scoped snapshots.
///
/// The gate holds no locks of its own. Two concurrent misses for the same
/// key both fetch and the last write wins; the next read revalidates.
pub struct CacheGate<B> {
  store: Arc<LocalSnapshotStore<B>>,
}

impl<B: SnapshotBackend> CacheGate<B> {
  pub fn new(backend: B) -> Self {
    Self {
      store: Arc::new(LocalSnapshotStore::new(backend)),
    }
  }

  pub fn store(&self) -> &LocalSnapshotStore<B> {
    &self.store
  }

  /// Serve `resource` from the local store when `policy` deems it fresh,
  /// otherwise fetch, persist and return it.
  ///
  /// The remote marker is read before the payload, so a concurrent remote
  /// write can only leave the stored version older than the payload. With
  /// `force_refresh` the comparison is skipped and a failed version read
  /// is tolerated; the entry is then stored without a version.
  pub async fn read_through<T, P, F, Fut, E>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
    policy: &P,
    fetch_payload: F,
    force_refresh: bool,
  ) -> Result<CacheResult<T>, GateError>
  where
    T: Serialize + DeserializeOwned,
    P: FreshnessPolicy,
    F: FnOnce(TenantId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
  {
    let remote = match policy.observe(tenant, resource).await {
      Ok(remote) => remote,
      Err(e) if force_refresh => {
        warn!(%tenant, %resource, error = %e, "version unavailable, refreshing without it");
        None
      }
      Err(source) => {
        return Err(GateError::VersionUnavailable {
          tenant: tenant.clone(),
          resource: resource.clone(),
          source,
        })
      }
    };

    if force_refresh {
      debug!(%tenant, %resource, "forced refresh");
    } else {
      match self.store.get::<T>(tenant, resource) {
        Some(entry) if policy.is_fresh(&entry, remote) => {
          debug!(%tenant, %resource, version = ?remote, "cache hit");
          return Ok(CacheResult::from_cache(entry));
        }
        Some(entry) => {
          debug!(%tenant, %resource, cached = ?entry.version, version = ?remote, "cache stale");
        }
        None => debug!(%tenant, %resource, "cache miss"),
      }
    }

    let payload = fetch_payload(tenant.clone())
      .await
      .map_err(|e| GateError::PayloadFetchFailed {
        tenant: tenant.clone(),
        resource: resource.clone(),
        source: e.into(),
      })?;

    let entry = CacheEntry::new(remote, payload);
    self.store.set(tenant, resource, &entry);
    Ok(CacheResult::from_network(entry))
  }

  /// [`read_through`](Self::read_through) gated on a remote version counter.
  pub async fn read_versioned<T, FV, VFut, VE, F, Fut, E>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
    fetch_version: FV,
    fetch_payload: F,
    force_refresh: bool,
  ) -> Result<CacheResult<T>, GateError>
  where
    T: Serialize + DeserializeOwned,
    FV: Fn(TenantId) -> VFut + Send + Sync,
    VFut: Future<Output = Result<Option<Version>, VE>> + Send,
    VE: Into<BoxError>,
    F: FnOnce(TenantId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
  {
    let policy =
      VersionPolicy::new(move |tenant: TenantId, _resource: ResourceKey| fetch_version(tenant));
    self
      .read_through(tenant, resource, &policy, fetch_payload, force_refresh)
      .await
  }

  /// Like [`read_through`](Self::read_through), but serve the local entry
  /// as [`CacheSource::Offline`](super::CacheSource::Offline) when the
  /// remote cannot be reached.
  pub async fn read_with_fallback<T, P, F, Fut, E>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
    policy: &P,
    fetch_payload: F,
    force_refresh: bool,
  ) -> Result<CacheResult<T>, GateError>
  where
    T: Serialize + DeserializeOwned,
    P: FreshnessPolicy,
    F: FnOnce(TenantId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
  {
    match self
      .read_through(tenant, resource, policy, fetch_payload, force_refresh)
      .await
    {
      Ok(result) => Ok(result),
      Err(e) => match self.stale(tenant, resource) {
        Some(entry) => {
          warn!(%tenant, %resource, error = %e, "serving stale cache");
          Ok(CacheResult::offline(entry))
        }
        None => Err(e),
      },
    }
  }

  /// Local entry without any remote check.
  pub fn stale<T: DeserializeOwned>(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
  ) -> Option<CacheEntry<T>> {
    self.store.get(tenant, resource)
  }

  /// Drop one entry so the next read refetches. Returns whether it existed.
  pub fn invalidate(&self, tenant: &TenantId, resource: &ResourceKey) -> bool {
    let removed = self.store.clear(tenant, resource);
    debug!(%tenant, %resource, removed, "invalidated");
    removed
  }

  pub fn invalidate_many<'a>(
    &self,
    tenant: &TenantId,
    resources: impl IntoIterator<Item = &'a ResourceKey>,
  ) -> usize {
    resources
      .into_iter()
      .filter(|resource| self.invalidate(tenant, resource))
      .count()
  }

  /// Drop every scope of a resource family, e.g. all dashboard months.
  pub fn invalidate_family(&self, tenant: &TenantId, family: &str) -> usize {
    let removed = self.store.clear_family(tenant, family);
    debug!(%tenant, family, removed, "invalidated family");
    removed
  }

  pub fn clear_all_for_tenant(&self, tenant: &TenantId) -> usize {
    let removed = self.store.clear_all_for_tenant(tenant);
    debug!(%tenant, removed, "cleared tenant cache");
    removed
  }

  /// Apply `f` to the cached payload, keeping its version and timestamp.
  ///
  /// The next version check still decides validity, so a local edit is
  /// replaced as soon as the remote version moves. Returns `false` when
  /// there is no entry to update.
  pub fn update_payload<T, F>(&self, tenant: &TenantId, resource: &ResourceKey, f: F) -> bool
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    let Some(mut entry) = self.store.get::<T>(tenant, resource) else {
      return false;
    };
    f(&mut entry.payload);
    self.store.set(tenant, resource, &entry);
    debug!(%tenant, %resource, "updated cached payload");
    true
  }
}

impl<B> Clone for CacheGate<B> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}
