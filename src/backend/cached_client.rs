//! Backend client with version-gated caching for one dealership.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::{
  CacheGate, CacheResult, FreshnessPolicy, GateError, ResourceKey, SessionCache, SnapshotBackend,
  TenantId, TtlPolicy, VersionPolicy, YearMonth,
};
use crate::event::InvalidationListener;

use super::cache::LeadsQuery;
use super::client::BackendClient;
use super::error::BackendError;
use super::types::{
  Banner, Catalog, Category, DashboardSnapshot, HomeFeed, InventoryVehicle, LeadsPage, NewSale,
  RowId, Sale, StockSnapshot, VehicleDetail,
};

/// How a read treats the local snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
  /// Refetch even if the snapshot is current
  pub force_refresh: bool,
  /// Serve the snapshot when the backend cannot be reached
  pub allow_stale: bool,
}

/// Backend client with transparent caching support.
///
/// Reads of versioned resources go through the cache gate; mutations drop
/// or patch the snapshots they affect so the next read is correct.
pub struct CachedBackend<B> {
  inner: BackendClient,
  gate: CacheGate<B>,
  tenant: TenantId,
  categories: TtlPolicy,
  leads: Arc<SessionCache<LeadsPage>>,
}

impl<B: SnapshotBackend> CachedBackend<B> {
  pub fn new(inner: BackendClient, gate: CacheGate<B>, tenant: TenantId) -> Self {
    Self {
      inner,
      gate,
      tenant,
      categories: TtlPolicy::default(),
      leads: Arc::new(SessionCache::new()),
    }
  }

  pub fn with_categories_ttl(mut self, policy: TtlPolicy) -> Self {
    self.categories = policy;
    self
  }

  pub fn with_leads_ttl(mut self, ttl: Duration) -> Self {
    self.leads = Arc::new(SessionCache::with_ttl(ttl));
    self
  }

  pub fn tenant(&self) -> &TenantId {
    &self.tenant
  }

  pub fn gate(&self) -> &CacheGate<B> {
    &self.gate
  }

  /// Listener that invalidates this tenant's snapshots on change events.
  pub fn listener(&self) -> InvalidationListener<B> {
    InvalidationListener::new(self.gate.clone(), self.tenant.clone())
  }

  async fn read<T, P, F, Fut>(
    &self,
    resource: &ResourceKey,
    policy: &P,
    fetch_payload: F,
    options: ReadOptions,
  ) -> Result<CacheResult<T>, GateError>
  where
    T: Serialize + DeserializeOwned,
    P: FreshnessPolicy,
    F: FnOnce(TenantId) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
  {
    if options.allow_stale {
      self
        .gate
        .read_with_fallback(&self.tenant, resource, policy, fetch_payload, options.force_refresh)
        .await
    } else {
      self
        .gate
        .read_through(&self.tenant, resource, policy, fetch_payload, options.force_refresh)
        .await
    }
  }

  /// Read `resource` gated on its `dealership_versions` counter.
  async fn versioned<T, F, Fut>(
    &self,
    resource: ResourceKey,
    options: ReadOptions,
    fetch: F,
  ) -> Result<CacheResult<T>, GateError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(BackendClient, TenantId) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
  {
    let client = self.inner.clone();
    let policy = VersionPolicy::new(move |tenant: TenantId, resource: ResourceKey| {
      let client = client.clone();
      async move { client.fetch_version(&tenant, &resource).await }
    });

    let inner = self.inner.clone();
    self
      .read(&resource, &policy, move |tenant| fetch(inner, tenant), options)
      .await
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  pub async fn catalog(&self, options: ReadOptions) -> Result<CacheResult<Catalog>, GateError> {
    self
      .versioned(ResourceKey::Vehicles, options, |client, tenant| async move {
        client.fetch_catalog(&tenant).await
      })
      .await
  }

  pub async fn vehicle(
    &self,
    id: &str,
    options: ReadOptions,
  ) -> Result<CacheResult<VehicleDetail>, GateError> {
    let id = id.to_string();
    self
      .versioned(ResourceKey::Vehicle(id.clone()), options, |client, tenant| async move {
        client.fetch_vehicle(&tenant, &id).await
      })
      .await
  }

  pub async fn inventory(
    &self,
    options: ReadOptions,
  ) -> Result<CacheResult<Vec<InventoryVehicle>>, GateError> {
    self
      .versioned(ResourceKey::Inventory, options, |client, tenant| async move {
        client.fetch_inventory(&tenant).await
      })
      .await
  }

  pub async fn home(&self, options: ReadOptions) -> Result<CacheResult<HomeFeed>, GateError> {
    self
      .versioned(ResourceKey::Home, options, |client, tenant| async move {
        client.fetch_home(&tenant).await
      })
      .await
  }

  pub async fn banners(&self, options: ReadOptions) -> Result<CacheResult<Vec<Banner>>, GateError> {
    self
      .versioned(ResourceKey::Banners, options, |client, tenant| async move {
        client.fetch_banners(&tenant).await
      })
      .await
  }

  pub async fn dashboard(
    &self,
    month: YearMonth,
    options: ReadOptions,
  ) -> Result<CacheResult<DashboardSnapshot>, GateError> {
    self
      .versioned(ResourceKey::Dashboard(month), options, move |client, tenant| async move {
        client.fetch_dashboard(&tenant, month).await
      })
      .await
  }

  pub async fn stock(&self, options: ReadOptions) -> Result<CacheResult<StockSnapshot>, GateError> {
    self
      .versioned(ResourceKey::Stock, options, |client, tenant| async move {
        client.fetch_stock(&tenant).await
      })
      .await
  }

  /// Categories have no version counter and are cached for a fixed time.
  pub async fn categories(
    &self,
    options: ReadOptions,
  ) -> Result<CacheResult<Vec<Category>>, GateError> {
    let inner = self.inner.clone();
    self
      .read(
        &ResourceKey::Categories,
        &self.categories,
        |tenant| async move { inner.fetch_categories(&tenant).await },
        options,
      )
      .await
  }

  /// A page of leads, kept in memory until the session ends or a lead changes.
  pub async fn leads(&self, query: &LeadsQuery) -> Result<LeadsPage, BackendError> {
    self
      .leads
      .get_or_fetch(query, || self.inner.fetch_leads(query))
      .await
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Create a vehicle and show it first in the cached inventory.
  pub async fn create_vehicle(
    &self,
    fields: &Map<String, Value>,
  ) -> Result<InventoryVehicle, BackendError> {
    let created = self.inner.create_vehicle(&self.tenant, fields).await?;

    self
      .gate
      .update_payload::<Vec<InventoryVehicle>, _>(&self.tenant, &ResourceKey::Inventory, |list| {
        list.retain(|vehicle| vehicle.id != created.id);
        list.insert(0, created.clone());
      });
    self
      .gate
      .invalidate_many(&self.tenant, &[ResourceKey::Vehicles, ResourceKey::Home]);

    Ok(created)
  }

  /// Update a vehicle and replace it in the cached inventory.
  pub async fn update_vehicle(
    &self,
    id: &RowId,
    changes: &Map<String, Value>,
  ) -> Result<InventoryVehicle, BackendError> {
    let updated = self.inner.update_vehicle(&self.tenant, id, changes).await?;

    self
      .gate
      .update_payload::<Vec<InventoryVehicle>, _>(&self.tenant, &ResourceKey::Inventory, |list| {
        if let Some(slot) = list.iter_mut().find(|vehicle| vehicle.id == updated.id) {
          *slot = updated.clone();
        }
      });
    self.gate.invalidate_many(
      &self.tenant,
      &[
        ResourceKey::Vehicles,
        ResourceKey::Home,
        ResourceKey::Vehicle(id.to_string()),
      ],
    );

    Ok(updated)
  }

  pub async fn delete_vehicle(&self, id: &RowId) -> Result<(), BackendError> {
    self.inner.delete_vehicle(&self.tenant, id).await?;
    self.gate.invalidate_many(
      &self.tenant,
      &[
        ResourceKey::Inventory,
        ResourceKey::Vehicles,
        ResourceKey::Home,
        ResourceKey::Vehicle(id.to_string()),
      ],
    );
    Ok(())
  }

  /// Register a sale; stock and every dashboard month are refetched.
  pub async fn register_sale(&self, sale: &NewSale) -> Result<Sale, BackendError> {
    let stored = self.inner.register_sale(&self.tenant, sale).await?;
    self.gate.invalidate(&self.tenant, &ResourceKey::Stock);
    self.gate.invalidate_family(&self.tenant, "dashboard");
    Ok(stored)
  }

  pub async fn create_banner(
    &self,
    image_url: &str,
    order: Option<i64>,
  ) -> Result<Banner, BackendError> {
    let banner = self.inner.create_banner(&self.tenant, image_url, order).await?;
    self.gate.invalidate(&self.tenant, &ResourceKey::Banners);
    Ok(banner)
  }

  pub async fn delete_banner(&self, id: &RowId) -> Result<(), BackendError> {
    self.inner.delete_banner(&self.tenant, id).await?;
    self.gate.invalidate(&self.tenant, &ResourceKey::Banners);
    Ok(())
  }

  /// Create a category and add it to the cached list, kept sorted by name.
  pub async fn create_category(&self, name: &str) -> Result<Category, BackendError> {
    let category = self.inner.create_category(&self.tenant, name).await?;

    self
      .gate
      .update_payload::<Vec<Category>, _>(&self.tenant, &ResourceKey::Categories, |list| {
        list.push(category.clone());
        list.sort_by(|a, b| a.name.cmp(&b.name));
      });
    self.gate.invalidate(&self.tenant, &ResourceKey::Vehicles);

    Ok(category)
  }

  pub async fn update_lead_status(&self, id: &RowId, status: &str) -> Result<(), BackendError> {
    self.inner.update_lead_status(id, status).await?;
    self.leads.clear();
    Ok(())
  }

  pub async fn delete_lead(&self, id: &RowId) -> Result<(), BackendError> {
    self.inner.delete_lead(id).await?;
    self.leads.clear();
    Ok(())
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  /// Drop every snapshot of this tenant and the session cache.
  pub fn refresh_all(&self) -> usize {
    self.leads.clear();
    self.gate.clear_all_for_tenant(&self.tenant)
  }

  /// Forget per-session data, e.g. on logout. Snapshots stay on disk.
  pub fn end_session(&self) {
    let cleared = self.leads.clear();
    debug!(tenant = %self.tenant, cleared, "session ended");
  }
}

impl<B> Clone for CachedBackend<B> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
      gate: self.gate.clone(),
      tenant: self.tenant.clone(),
      categories: self.categories,
      leads: Arc::clone(&self.leads),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::Credentials;
  use crate::cache::{CacheEntry, CacheSource, MemoryBackend, Version};
  use serde_json::json;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn cached(server: &MockServer) -> CachedBackend<MemoryBackend> {
    let client = BackendClient::new(
      &server.uri(),
      Credentials {
        api_key: "anon-key".to_string(),
        access_token: None,
      },
    )
    .unwrap();
    CachedBackend::new(client, CacheGate::new(MemoryBackend::new()), TenantId::from("t1"))
  }

  fn inventory_row(id: i64, name: &str) -> Value {
    json!({
      "id": id, "name": name, "price": 100.0, "stock": 1, "destacado": false,
      "discount": null, "image_urls": [], "thumbnail_url": null, "created_at": null
    })
  }

  async fn mount_version(server: &MockServer, column: &str, version: i64, hits: u64) {
    Mock::given(method("GET"))
      .and(path("/rest/v1/dealership_versions"))
      .and(query_param("select", column))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ column: version }])))
      .expect(hits)
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn test_catalog_hit_skips_payload_queries() {
    let server = MockServer::start().await;
    mount_version(&server, "vehicles_version", 5, 2).await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/products"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/categories"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "SUV" }])))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    let first = backend.catalog(ReadOptions::default()).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.version, Some(5));

    let second = backend.catalog(ReadOptions::default()).await.unwrap();
    assert!(second.is_hit());
    assert_eq!(second.data.categories[0].name, "SUV");
  }

  #[tokio::test]
  async fn test_categories_use_ttl_without_version_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/dealership_versions"))
      .respond_with(ResponseTemplate::new(500))
      .expect(0)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/categories"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        { "id": 1, "name": "Pickup", "subcategories": ["4x4"] }
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    backend.categories(ReadOptions::default()).await.unwrap();
    let second = backend.categories(ReadOptions::default()).await.unwrap();
    assert!(second.is_hit());
    assert_eq!(second.data[0].subcategories, vec!["4x4".to_string()]);
  }

  #[tokio::test]
  async fn test_create_vehicle_prepends_to_cached_inventory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/products"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([inventory_row(2, "Hilux")])))
      .mount(&server)
      .await;

    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    let existing: Vec<InventoryVehicle> =
      serde_json::from_value(json!([inventory_row(1, "Gol")])).unwrap();
    let store = backend.gate().store();
    store.set(&tenant, &ResourceKey::Inventory, &CacheEntry::new(Some(5), existing));
    store.set(&tenant, &ResourceKey::Vehicles, &CacheEntry::new(Some(5), json!({})));

    let fields = json!({ "name": "Hilux" });
    backend
      .create_vehicle(fields.as_object().unwrap())
      .await
      .unwrap();

    let inventory = backend
      .gate()
      .stale::<Vec<InventoryVehicle>>(&tenant, &ResourceKey::Inventory)
      .unwrap();
    assert_eq!(inventory.version, Some(5));
    assert_eq!(inventory.payload[0].name, "Hilux");
    assert_eq!(inventory.payload.len(), 2);
    assert!(backend
      .gate()
      .stale::<Value>(&tenant, &ResourceKey::Vehicles)
      .is_none());
  }

  #[tokio::test]
  async fn test_create_category_keeps_cached_list_sorted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/categories"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([
        { "id": 3, "name": "Moto", "subcategories": [] }
      ])))
      .mount(&server)
      .await;

    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    let existing: Vec<Category> = serde_json::from_value(json!([
      { "id": 1, "name": "Auto", "subcategories": [] },
      { "id": 2, "name": "Pickup", "subcategories": [] }
    ]))
    .unwrap();
    backend
      .gate()
      .store()
      .set(&tenant, &ResourceKey::Categories, &CacheEntry::new(None, existing));

    backend.create_category("Moto").await.unwrap();

    let names: Vec<String> = backend
      .gate()
      .stale::<Vec<Category>>(&tenant, &ResourceKey::Categories)
      .unwrap()
      .payload
      .into_iter()
      .map(|category| category.name)
      .collect();
    assert_eq!(names, vec!["Auto", "Moto", "Pickup"]);
  }

  #[tokio::test]
  async fn test_register_sale_invalidates_stock_and_dashboards() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/ventas"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
        "id": 1, "fecha": "2026-03-02", "precio_venta": 1.0
      }])))
      .mount(&server)
      .await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/vehicles"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 9 }])))
      .mount(&server)
      .await;

    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    let march = ResourceKey::Dashboard(YearMonth::new(2026, 3).unwrap());
    for resource in [&march, &ResourceKey::Stock, &ResourceKey::Banners] {
      backend
        .gate()
        .store()
        .set(&tenant, resource, &CacheEntry::new(Some(1), 0u8));
    }

    let sale = NewSale {
      vehicle_id: RowId::Int(9),
      date: "2026-03-02".to_string(),
      sale_price: 1.0,
      customer_name: None,
      customer_phone: None,
      payment_method: None,
      notes: None,
    };
    backend.register_sale(&sale).await.unwrap();

    assert!(backend.gate().stale::<u8>(&tenant, &march).is_none());
    assert!(backend.gate().stale::<u8>(&tenant, &ResourceKey::Stock).is_none());
    assert!(backend.gate().stale::<u8>(&tenant, &ResourceKey::Banners).is_some());
  }

  #[tokio::test]
  async fn test_leads_cached_until_status_change() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/leads"))
      .respond_with(
        ResponseTemplate::new(200)
          .insert_header("content-range", "0-0/1")
          .set_body_json(json!([{
            "id": 1, "full_name": "Ana", "phone": null, "vehicle_label": null,
            "status": "new", "notes": null, "created_at": null
          }])),
      )
      .expect(2)
      .mount(&server)
      .await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/leads"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    let query = LeadsQuery::new("s1", 1, "");
    backend.leads(&query).await.unwrap();
    let cached_page = backend.leads(&query).await.unwrap();
    assert_eq!(cached_page.total, Some(1));

    backend
      .update_lead_status(&RowId::Int(1), "contacted")
      .await
      .unwrap();
    backend.leads(&query).await.unwrap();
  }

  #[tokio::test]
  async fn test_stale_banners_served_when_backend_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    let banners: Vec<Banner> =
      serde_json::from_value(json!([{ "id": 1, "image_url": "a.webp", "order": 1 }])).unwrap();
    backend
      .gate()
      .store()
      .set(&tenant, &ResourceKey::Banners, &CacheEntry::new(Some(2), banners));

    let err = backend.banners(ReadOptions::default()).await.unwrap_err();
    assert!(matches!(err, GateError::VersionUnavailable { .. }));

    let offline = backend
      .banners(ReadOptions {
        allow_stale: true,
        ..ReadOptions::default()
      })
      .await
      .unwrap();
    assert_eq!(offline.source, CacheSource::Offline);
    assert_eq!(offline.data[0].image_url, "a.webp");
  }

  #[tokio::test]
  async fn test_refresh_all_clears_tenant() {
    let server = MockServer::start().await;
    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    for resource in [&ResourceKey::Home, &ResourceKey::Stock] {
      backend
        .gate()
        .store()
        .set(&tenant, resource, &CacheEntry::new(Some(1), 0u8));
    }

    assert_eq!(backend.refresh_all(), 2);
    assert!(backend.gate().stale::<u8>(&tenant, &ResourceKey::Home).is_none());
  }

  fn seed(backend: &CachedBackend<MemoryBackend>, resources: &[ResourceKey]) {
    let tenant = backend.tenant().clone();
    for resource in resources {
      backend
        .gate()
        .store()
        .set(&tenant, resource, &CacheEntry::new(Some(3), 0u8));
    }
  }

  fn cached_version(
    backend: &CachedBackend<MemoryBackend>,
    resource: &ResourceKey,
  ) -> Option<Version> {
    backend
      .gate()
      .stale::<Value>(backend.tenant(), resource)
      .and_then(|entry| entry.version)
  }

  async fn mount_leads(server: &MockServer, hits: u64) {
    Mock::given(method("GET"))
      .and(path("/rest/v1/leads"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
        "id": 1, "full_name": "Ana", "phone": null, "vehicle_label": null,
        "status": "new", "notes": null, "created_at": null
      }])))
      .expect(hits)
      .mount(server)
      .await;
  }

  #[tokio::test]
  async fn test_update_vehicle_replaces_cached_row() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/products"))
      .and(query_param("id", "eq.1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([inventory_row(1, "Gol GTI")])))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    let tenant = TenantId::from("t1");
    let existing: Vec<InventoryVehicle> =
      serde_json::from_value(json!([inventory_row(2, "Hilux"), inventory_row(1, "Gol")])).unwrap();
    backend
      .gate()
      .store()
      .set(&tenant, &ResourceKey::Inventory, &CacheEntry::new(Some(5), existing));
    let own_page = ResourceKey::Vehicle("1".to_string());
    let other_page = ResourceKey::Vehicle("2".to_string());
    seed(
      &backend,
      &[
        ResourceKey::Vehicles,
        ResourceKey::Home,
        ResourceKey::Banners,
        own_page.clone(),
        other_page.clone(),
      ],
    );

    let changes = json!({ "name": "Gol GTI" });
    let updated = backend
      .update_vehicle(&RowId::Int(1), changes.as_object().unwrap())
      .await
      .unwrap();
    assert_eq!(updated.name, "Gol GTI");

    let inventory = backend
      .gate()
      .stale::<Vec<InventoryVehicle>>(&tenant, &ResourceKey::Inventory)
      .unwrap();
    assert_eq!(inventory.version, Some(5));
    let names: Vec<&str> = inventory.payload.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Hilux", "Gol GTI"]);

    for gone in [&ResourceKey::Vehicles, &ResourceKey::Home, &own_page] {
      assert_eq!(cached_version(&backend, gone), None, "{} should be dropped", gone);
    }
    assert_eq!(cached_version(&backend, &other_page), Some(3));
    assert_eq!(cached_version(&backend, &ResourceKey::Banners), Some(3));
  }

  #[tokio::test]
  async fn test_delete_vehicle_drops_listings_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/rest/v1/products"))
      .and(query_param("id", "eq.1"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    let own_page = ResourceKey::Vehicle("1".to_string());
    let other_page = ResourceKey::Vehicle("2".to_string());
    let dropped = [
      ResourceKey::Inventory,
      ResourceKey::Vehicles,
      ResourceKey::Home,
      own_page,
    ];
    seed(&backend, &dropped);
    seed(&backend, &[other_page.clone(), ResourceKey::Stock]);

    backend.delete_vehicle(&RowId::Int(1)).await.unwrap();

    for gone in &dropped {
      assert_eq!(cached_version(&backend, gone), None, "{} should be dropped", gone);
    }
    assert_eq!(cached_version(&backend, &other_page), Some(3));
    assert_eq!(cached_version(&backend, &ResourceKey::Stock), Some(3));
  }

  #[tokio::test]
  async fn test_banner_mutations_drop_only_banners() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/banners"))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([
        { "id": 3, "image_url": "c.webp", "order": 3 }
      ])))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/rest/v1/banners"))
      .and(query_param("id", "eq.3"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    seed(&backend, &[ResourceKey::Banners, ResourceKey::Home]);

    let banner = backend.create_banner("c.webp", Some(3)).await.unwrap();
    assert_eq!(banner.id, RowId::Int(3));
    assert_eq!(cached_version(&backend, &ResourceKey::Banners), None);
    assert_eq!(cached_version(&backend, &ResourceKey::Home), Some(3));

    seed(&backend, &[ResourceKey::Banners]);
    backend.delete_banner(&banner.id).await.unwrap();
    assert_eq!(cached_version(&backend, &ResourceKey::Banners), None);
    assert_eq!(cached_version(&backend, &ResourceKey::Home), Some(3));
  }

  #[tokio::test]
  async fn test_delete_lead_clears_session_cache() {
    let server = MockServer::start().await;
    mount_leads(&server, 2).await;
    Mock::given(method("DELETE"))
      .and(path("/rest/v1/leads"))
      .and(query_param("id", "eq.1"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let backend = cached(&server);
    seed(&backend, &[ResourceKey::Home]);
    let query = LeadsQuery::new("s1", 1, "");
    backend.leads(&query).await.unwrap();
    backend.leads(&query).await.unwrap();

    backend.delete_lead(&RowId::Int(1)).await.unwrap();
    backend.leads(&query).await.unwrap();
    assert_eq!(cached_version(&backend, &ResourceKey::Home), Some(3));
  }

  #[tokio::test]
  async fn test_end_session_keeps_snapshots() {
    let server = MockServer::start().await;
    mount_leads(&server, 2).await;

    let backend = cached(&server);
    seed(&backend, &[ResourceKey::Home, ResourceKey::Stock]);
    let query = LeadsQuery::new("s1", 1, "ana");
    backend.leads(&query).await.unwrap();

    backend.end_session();

    backend.leads(&query).await.unwrap();
    assert_eq!(cached_version(&backend, &ResourceKey::Home), Some(3));
    assert_eq!(cached_version(&backend, &ResourceKey::Stock), Some(3));
  }
}
