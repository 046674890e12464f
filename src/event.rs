use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheGate, ResourceKey, SnapshotBackend, TenantId};

/// Row change notification from the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeEvent {
  /// Table the change happened in
  pub table: String,
  /// Owner of the changed row; `None` when the feed is already tenant-scoped
  #[serde(default)]
  pub dealership_id: Option<TenantId>,
  /// INSERT, UPDATE or DELETE, informational only
  #[serde(default, alias = "eventType")]
  pub event_type: Option<String>,
}

impl ChangeEvent {
  pub fn new(table: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      dealership_id: None,
      event_type: None,
    }
  }

  pub fn for_tenant(mut self, tenant: TenantId) -> Self {
    self.dealership_id = Some(tenant);
    self
  }
}

/// What a change makes stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
  Resource(ResourceKey),
  /// Every scope of a parameterized resource
  Family(&'static str),
}

/// Resources built from rows of `table`.
pub fn invalidations_for(table: &str) -> Vec<Invalidation> {
  use Invalidation::{Family, Resource};

  match table {
    "products" => vec![
      Resource(ResourceKey::Vehicles),
      Resource(ResourceKey::Inventory),
      Resource(ResourceKey::Home),
      Family("vehicle"),
    ],
    "vehicles" | "ventas" => vec![Resource(ResourceKey::Stock), Family("dashboard")],
    "general_expenses" => vec![Family("dashboard")],
    "banners" => vec![Resource(ResourceKey::Banners)],
    "clientes" => vec![Resource(ResourceKey::Home)],
    "categories" => vec![
      Resource(ResourceKey::Categories),
      Resource(ResourceKey::Vehicles),
    ],
    _ => Vec::new(),
  }
}

/// Stream of change events read from newline-delimited JSON
pub struct ChangeFeed {
  rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeFeed {
  /// Spawn a reader task that parses one event per line.
  /// Lines that are blank or fail to parse are skipped.
  pub fn from_reader<R>(reader: R) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut lines = BufReader::new(reader).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            let line = line.trim();
            if line.is_empty() {
              continue;
            }
            match serde_json::from_str::<ChangeEvent>(line) {
              Ok(event) => {
                if tx.send(event).is_err() {
                  break;
                }
              }
              Err(e) => warn!(error = %e, "skipping malformed change event"),
            }
          }
          Ok(None) => break,
          Err(e) => {
            warn!(error = %e, "change feed read failed");
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Feed driven by an existing channel
  pub fn from_channel(rx: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<ChangeEvent> {
    self.rx.recv().await
  }
}

/// Invalidates one tenant's cache in response to change events.
///
/// Events never carry data into the cache; the next read refetches.
pub struct InvalidationListener<B> {
  gate: CacheGate<B>,
  tenant: TenantId,
}

impl<B: SnapshotBackend> InvalidationListener<B> {
  pub fn new(gate: CacheGate<B>, tenant: TenantId) -> Self {
    Self { gate, tenant }
  }

  /// Apply one event. Returns how many entries were dropped.
  pub fn apply(&self, event: &ChangeEvent) -> usize {
    if let Some(owner) = &event.dealership_id {
      if owner != &self.tenant {
        debug!(table = %event.table, %owner, "ignoring change for other tenant");
        return 0;
      }
    }

    let removed = invalidations_for(&event.table)
      .into_iter()
      .map(|invalidation| match invalidation {
        Invalidation::Resource(resource) => {
          usize::from(self.gate.invalidate(&self.tenant, &resource))
        }
        Invalidation::Family(family) => self.gate.invalidate_family(&self.tenant, family),
      })
      .sum();

    info!(tenant = %self.tenant, table = %event.table, removed, "change received");
    removed
  }

  /// Consume events until the feed closes. Returns the number of events seen.
  pub async fn run(self, mut feed: ChangeFeed) -> usize {
    let mut seen = 0;
    while let Some(event) = feed.next().await {
      self.apply(&event);
      seen += 1;
    }
    seen
  }
}
