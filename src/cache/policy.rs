//! Freshness policies deciding whether a local snapshot may be served.

use std::future::{ready, Future};

use chrono::{Duration, Utc};

use super::traits::{BoxError, CacheEntry, ResourceKey, TenantId, Version};

/// Upper bound for [`TtlPolicy::from_secs`], the largest whole-second span chrono represents.
const MAX_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

/// Decides whether a cached entry is still valid.
pub trait FreshnessPolicy: Send + Sync {
  /// Read the remote freshness marker for a resource, if the policy uses one.
  fn observe(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
  ) -> impl Future<Output = Result<Option<Version>, BoxError>> + Send;

  /// Whether `entry` may be served given the marker from [`observe`](Self::observe).
  fn is_fresh<T>(&self, entry: &CacheEntry<T>, remote: Option<Version>) -> bool;
}

/// Serve a snapshot only while the remote version equals the stored one.
///
/// A missing remote version never matches, so unversioned resources are
/// refetched on every read.
pub struct VersionPolicy<F> {
  fetch_version: F,
}

impl<F> VersionPolicy<F> {
  pub fn new(fetch_version: F) -> Self {
    Self { fetch_version }
  }
}

impl<F, Fut, E> FreshnessPolicy for VersionPolicy<F>
where
  F: Fn(TenantId, ResourceKey) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Option<Version>, E>> + Send,
  E: Into<BoxError>,
{
  fn observe(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
  ) -> impl Future<Output = Result<Option<Version>, BoxError>> + Send {
    let fut = (self.fetch_version)(tenant.clone(), resource.clone());
    async move { fut.await.map_err(Into::into) }
  }

  fn is_fresh<T>(&self, entry: &CacheEntry<T>, remote: Option<Version>) -> bool {
    matches!((entry.version, remote), (Some(local), Some(remote)) if local == remote)
  }
}

/// Serve a snapshot until it is older than a fixed time-to-live.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
  ttl: Duration,
}

impl TtlPolicy {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }

  pub fn from_secs(secs: u64) -> Self {
    Self::new(Duration::seconds(secs.min(MAX_TTL_SECS) as i64))
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self::new(Duration::minutes(5))
  }
}

impl FreshnessPolicy for TtlPolicy {
  fn observe(
    &self,
    _tenant: &TenantId,
    _resource: &ResourceKey,
  ) -> impl Future<Output = Result<Option<Version>, BoxError>> + Send {
    ready(Ok(None))
  }

  fn is_fresh<T>(&self, entry: &CacheEntry<T>, _remote: Option<Version>) -> bool {
    Utc::now() - entry.cached_at <= self.ttl
  }
}
