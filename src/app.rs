use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tracing::{info, warn};

use lotcache::backend::{BackendClient, CachedBackend, LeadsQuery, ReadOptions};
use lotcache::cache::{
  CacheGate, CacheResult, MemoryBackend, NoopBackend, ResourceKey, SnapshotBackend, SqliteBackend,
  TenantId, TtlPolicy,
};
use lotcache::commands;
use lotcache::config::{CacheConfig, Config};
use lotcache::event::ChangeFeed;

/// One dealership session of the CLI.
pub struct App {
  backend: CachedBackend<Box<dyn SnapshotBackend>>,
}

impl App {
  /// Connect to the backend and resolve the dealership to act for.
  ///
  /// `dealership` is a slug and takes precedence over the configured one.
  pub async fn new(config: &Config, dealership: Option<&str>) -> Result<Self> {
    let client = BackendClient::new(&config.backend.url, Config::credentials()?)?;
    let tenant = Self::resolve_tenant(&client, config, dealership).await?;
    info!(%tenant, "using dealership");

    let gate = CacheGate::new(Self::snapshot_backend(&config.cache));
    let mut backend = CachedBackend::new(client, gate, tenant)
      .with_categories_ttl(TtlPolicy::from_secs(config.cache.categories_ttl_secs));
    if let Some(secs) = config.cache.leads_ttl_secs {
      backend = backend.with_leads_ttl(Duration::from_secs(secs));
    }

    Ok(Self { backend })
  }

  async fn resolve_tenant(
    client: &BackendClient,
    config: &Config,
    dealership: Option<&str>,
  ) -> Result<TenantId> {
    let slug = match (dealership, &config.dealership.id) {
      (Some(slug), _) => slug,
      (None, Some(id)) => return Ok(TenantId::from(id.as_str())),
      (None, None) => config
        .dealership
        .slug
        .as_deref()
        .ok_or_else(|| eyre!("No dealership configured. Set dealership.id or pass --dealership"))?,
    };

    let found = client
      .resolve_dealership(slug)
      .await?
      .ok_or_else(|| eyre!("Dealership not found: {}", slug))?;
    Ok(TenantId::from(found.id))
  }

  /// SQLite snapshots, or an in-memory store if the database cannot be opened.
  fn snapshot_backend(config: &CacheConfig) -> Box<dyn SnapshotBackend> {
    if !config.enabled {
      return Box::new(NoopBackend);
    }

    let opened = match &config.path {
      Some(path) => SqliteBackend::open_at(path),
      None => SqliteBackend::open(),
    };
    match opened {
      Ok(sqlite) => Box::new(sqlite),
      Err(e) => {
        warn!(error = %e, "snapshot database unavailable, caching in memory");
        Box::new(MemoryBackend::new())
      }
    }
  }

  /// Print one resource as JSON on stdout and where it came from on stderr.
  pub async fn show(&self, resource: &ResourceKey, options: ReadOptions) -> Result<()> {
    let backend = &self.backend;
    match resource {
      ResourceKey::Vehicles => print_result(backend.catalog(options).await?),
      ResourceKey::Inventory => print_result(backend.inventory(options).await?),
      ResourceKey::Banners => print_result(backend.banners(options).await?),
      ResourceKey::Home => print_result(backend.home(options).await?),
      ResourceKey::Stock => print_result(backend.stock(options).await?),
      ResourceKey::Categories => print_result(backend.categories(options).await?),
      ResourceKey::Vehicle(id) => print_result(backend.vehicle(id, options).await?),
      ResourceKey::Dashboard(month) => print_result(backend.dashboard(*month, options).await?),
      ResourceKey::Custom(name) => {
        let hints = commands::did_you_mean(name);
        if hints.is_empty() {
          Err(eyre!("'{}' is not served by the backend", name))
        } else {
          Err(eyre!("Unknown resource '{}'. Did you mean: {}?", name, hints.join(", ")))
        }
      }
    }
  }

  pub async fn leads(&self, query: &LeadsQuery) -> Result<()> {
    let page = self.backend.leads(query).await?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
  }

  pub fn invalidate(&self, resources: &[ResourceKey]) -> usize {
    self
      .backend
      .gate()
      .invalidate_many(self.backend.tenant(), resources)
  }

  pub fn purge(&self) -> usize {
    self.backend.refresh_all()
  }

  /// End the session; snapshots on disk are kept for the next run.
  pub fn close(&self) {
    self.backend.end_session();
  }

  /// Apply change events read as JSON lines from stdin until EOF.
  pub async fn watch(&self) -> usize {
    let feed = ChangeFeed::from_reader(tokio::io::stdin());
    self.backend.listener().run(feed).await
  }
}

fn print_result<T: Serialize>(result: CacheResult<T>) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(&result.data)?);
  match result.version {
    Some(version) => eprintln!("source: {} (version {})", result.source, version),
    None => eprintln!("source: {}", result.source),
  }
  Ok(())
}
