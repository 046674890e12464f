//! Core traits and types for the caching system.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Server-owned counter for one resource scope. The client never increments it.
pub type Version = i64;

/// Error type accepted from injected fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opaque identifier of the dealership that owns cached data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TenantId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TenantId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

impl From<String> for TenantId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// Error parsing a resource key or month from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseResourceError {
  #[error("empty resource key")]
  Empty,
  #[error("invalid month '{0}', expected YYYY-MM")]
  InvalidMonth(String),
  #[error("resource '{0}' needs a month, e.g. dashboard:2026-01")]
  MissingMonth(String),
  #[error("resource '{0}' needs a vehicle id, e.g. vehicle:42")]
  MissingId(String),
  #[error("resource '{0}' needs a name, e.g. custom:promos")]
  MissingName(String),
}

/// A calendar month, used to parameterize monthly resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
  year: i32,
  month: u32,
}

impl YearMonth {
  /// Returns `None` unless `month` is in 1..=12.
  pub fn new(year: i32, month: u32) -> Option<Self> {
    (1..=12).contains(&month).then_some(Self { year, month })
  }

  pub fn current() -> Self {
    let now = Utc::now();
    Self {
      year: now.year(),
      month: now.month(),
    }
  }

  pub fn year(&self) -> i32 {
    self.year
  }

  pub fn month(&self) -> u32 {
    self.month
  }

  /// First day of this month and first day of the following month.
  pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
    let (next_year, next_month) = if self.month == 12 {
      (self.year.checked_add(1)?, 1)
    } else {
      (self.year, self.month + 1)
    };
    let start = NaiveDate::from_ymd_opt(self.year, self.month, 1)?;
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some((start, end))
  }
}

impl fmt::Display for YearMonth {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04}-{:02}", self.year, self.month)
  }
}

impl FromStr for YearMonth {
  type Err = ParseResourceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ParseResourceError::InvalidMonth(s.to_string());
    let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    Self::new(year, month).ok_or_else(invalid)
  }
}

/// Logical name of a cacheable result set.
///
/// Parameterized keys are distinct scopes with their own version lineage;
/// they share a [`family`](ResourceKey::family) so all of them can be
/// invalidated together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
  /// Public vehicle catalog with category names
  Vehicles,
  /// Admin vehicle list
  Inventory,
  Banners,
  /// Featured vehicles, offers and testimonials
  Home,
  /// Purchased vehicles and the ids already sold
  Stock,
  Categories,
  /// Public detail page of one vehicle
  Vehicle(String),
  /// Financial dashboard for one month
  Dashboard(YearMonth),
  /// Any other resource, named by the caller. Stored under `custom:<name>`
  /// so it never shares a slot or family with the resources above.
  Custom(String),
}

const CUSTOM_PREFIX: &str = "custom:";

impl ResourceKey {
  /// Prefix shared by every scope of this resource.
  ///
  /// Custom keys group by the part of their name before the first `:`,
  /// e.g. `custom:reports` for `reports:weekly`.
  pub fn family(&self) -> Cow<'static, str> {
    let fixed = match self {
      Self::Vehicles => "vehicles",
      Self::Inventory => "inventory",
      Self::Banners => "banners",
      Self::Home => "home",
      Self::Stock => "stock",
      Self::Categories => "categories",
      Self::Vehicle(_) => "vehicle",
      Self::Dashboard(_) => "dashboard",
      Self::Custom(name) => {
        let group = name.split_once(':').map_or(name.as_str(), |(group, _)| group);
        return Cow::Owned(format!("{}{}", CUSTOM_PREFIX, group));
      }
    };
    Cow::Borrowed(fixed)
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Vehicle(id) => write!(f, "vehicle:{}", id),
      Self::Dashboard(month) => write!(f, "dashboard:{}", month),
      Self::Custom(name) => write!(f, "{}{}", CUSTOM_PREFIX, name),
      other => f.write_str(&other.family()),
    }
  }
}

impl FromStr for ResourceKey {
  type Err = ParseResourceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    match s {
      "" => Err(ParseResourceError::Empty),
      "vehicles" => Ok(Self::Vehicles),
      "inventory" => Ok(Self::Inventory),
      "banners" => Ok(Self::Banners),
      "home" => Ok(Self::Home),
      "stock" => Ok(Self::Stock),
      "categories" => Ok(Self::Categories),
      "dashboard" => Err(ParseResourceError::MissingMonth(s.to_string())),
      "vehicle" | "vehicle:" => Err(ParseResourceError::MissingId(s.to_string())),
      "custom" | "custom:" => Err(ParseResourceError::MissingName(s.to_string())),
      _ => {
        if let Some(name) = s.strip_prefix(CUSTOM_PREFIX) {
          Ok(Self::Custom(name.to_string()))
        } else if let Some(month) = s.strip_prefix("dashboard:") {
          Ok(Self::Dashboard(month.parse()?))
        } else if let Some(id) = s.strip_prefix("vehicle:") {
          Ok(Self::Vehicle(id.to_string()))
        } else {
          Ok(Self::Custom(s.to_string()))
        }
      }
    }
  }
}

/// One local snapshot: the payload and the remote version it was fetched at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  /// Remote version at fetch time; `None` never matches
  pub version: Option<Version>,
  pub payload: T,
  /// Informational for versioned reads, authoritative for TTL reads
  pub cached_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  pub fn new(version: Option<Version>, payload: T) -> Self {
    Self {
      version,
      payload,
      cached_at: Utc::now(),
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Version the data was fetched at
  pub version: Option<Version>,
  /// When the data was fetched from the remote
  pub cached_at: DateTime<Utc>,
}

impl<T> CacheResult<T> {
  /// Data that was just fetched and persisted.
  pub fn from_network(entry: CacheEntry<T>) -> Self {
    Self::with_source(entry, CacheSource::Network)
  }

  /// Data served from a snapshot that passed the freshness check.
  pub fn from_cache(entry: CacheEntry<T>) -> Self {
    Self::with_source(entry, CacheSource::Cache)
  }

  /// Stale snapshot served because the remote could not be reached.
  pub fn offline(entry: CacheEntry<T>) -> Self {
    Self::with_source(entry, CacheSource::Offline)
  }

  fn with_source(entry: CacheEntry<T>, source: CacheSource) -> Self {
    Self {
      data: entry.payload,
      source,
      version: entry.version,
      cached_at: entry.cached_at,
    }
  }

  pub fn is_hit(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the remote
  Network,
  /// Local snapshot, still valid
  Cache,
  /// Local snapshot of unknown freshness, remote unavailable
  Offline,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Network => f.write_str("network"),
      Self::Cache => f.write_str("cache"),
      Self::Offline => f.write_str("offline"),
    }
  }
}

/// Key for in-memory query caches.
pub trait QueryKey {
  /// Normalized form of the query; equal descriptions share a cache slot.
  fn description(&self) -> String;

  /// SHA256 of the description, for stable fixed-length keys.
  fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }
}
