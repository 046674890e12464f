//! Version-gated caching of tenant-scoped query results.
//!
//! This module is backend-agnostic:
//! - Snapshots are stored per tenant and resource key, with the remote
//!   version they were fetched at
//! - A snapshot is served only while its freshness policy accepts it
//!   (matching remote version, or a time-to-live)
//! - Mutations invalidate entries or edit the cached payload, never the version
//! - Stale snapshots can be served when the remote is unreachable

mod error;
mod gate;
mod policy;
mod session;
mod storage;
mod traits;

pub use error::{GateError, StoreError};
pub use gate::CacheGate;
pub use policy::{FreshnessPolicy, TtlPolicy, VersionPolicy};
pub use session::SessionCache;
pub use storage::{LocalSnapshotStore, MemoryBackend, NoopBackend, SnapshotBackend, SqliteBackend};
pub use traits::{
  BoxError, CacheEntry, CacheResult, CacheSource, ParseResourceError, QueryKey, ResourceKey,
  TenantId, Version, YearMonth,
};
