//! Error types for the cache gate and the local snapshot store.

use thiserror::Error;

use super::traits::{BoxError, ResourceKey, TenantId};

/// Errors returned to callers of the cache gate.
///
/// Both are recoverable: the caller may retry, or serve the stale entry
/// via [`CacheGate::stale`](super::CacheGate::stale).
#[derive(Debug, Error)]
pub enum GateError {
  #[error("version for {resource} of tenant {tenant} is unavailable: {source}")]
  VersionUnavailable {
    tenant: TenantId,
    resource: ResourceKey,
    #[source]
    source: BoxError,
  },

  #[error("failed to fetch {resource} for tenant {tenant}: {source}")]
  PayloadFetchFailed {
    tenant: TenantId,
    resource: ResourceKey,
    #[source]
    source: BoxError,
  },
}

impl GateError {
  pub fn tenant(&self) -> &TenantId {
    match self {
      Self::VersionUnavailable { tenant, .. } | Self::PayloadFetchFailed { tenant, .. } => tenant,
    }
  }

  pub fn resource(&self) -> &ResourceKey {
    match self {
      Self::VersionUnavailable { resource, .. } | Self::PayloadFetchFailed { resource, .. } => {
        resource
      }
    }
  }
}

/// Failures inside a snapshot backend.
///
/// These never leave [`LocalSnapshotStore`](super::LocalSnapshotStore): reads
/// degrade to a miss and writes are dropped, both with a log event.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("cache directory error: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to (de)serialize snapshot: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("cache lock poisoned")]
  LockPoisoned,

  #[error("storage quota exceeded: need {needed} bytes, {available} available")]
  QuotaExceeded { needed: usize, available: usize },

  #[error("could not determine data directory")]
  NoDataDir,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_gate_error_accessors() {
    let err = GateError::PayloadFetchFailed {
      tenant: TenantId::from("t1"),
      resource: ResourceKey::Vehicles,
      source: "timeout".into(),
    };
    assert_eq!(err.tenant().as_str(), "t1");
    assert_eq!(err.resource(), &ResourceKey::Vehicles);
    assert_eq!(
      err.to_string(),
      "failed to fetch vehicles for tenant t1: timeout"
    );
  }

  #[test]
  fn test_gate_error_keeps_source() {
    use std::error::Error as _;

    let err = GateError::VersionUnavailable {
      tenant: TenantId::from("t1"),
      resource: ResourceKey::Home,
      source: "connection refused".into(),
    };
    assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("connection refused"));
  }

  #[test]
  fn test_quota_message() {
    let err = StoreError::QuotaExceeded {
      needed: 10,
      available: 4,
    };
    assert_eq!(
      err.to_string(),
      "storage quota exceeded: need 10 bytes, 4 available"
    );
  }
}
