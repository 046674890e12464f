//! PostgREST access for the dealership backend.

mod cache;
mod cached_client;
mod client;
mod error;
mod types;

pub use cache::{version_column, LeadsQuery};
pub use cached_client::{CachedBackend, ReadOptions};
pub use client::{BackendClient, Credentials, LEADS_PAGE_SIZE};
pub use error::BackendError;
pub use types::*;
