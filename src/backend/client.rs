//! REST client for the dealership backend.
//!
//! Talks to a PostgREST endpoint under `<url>/rest/v1/`. Every query on a
//! tenant-owned table filters on `dealership_id`.

use std::fmt::Display;
use std::time::Duration;

use chrono::Utc;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

use super::cache::{version_column, LeadsQuery};
use super::error::BackendError;
use super::types::{
  Banner, Catalog, Category, Dealership, DashboardSnapshot, HomeFeed, InventoryVehicle, LeadsPage,
  NewSale, RowId, Sale, StockSnapshot, VehicleDetail,
};
use crate::cache::{ResourceKey, TenantId, Version, YearMonth};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Leads shown per page.
pub const LEADS_PAGE_SIZE: u64 = 10;

const HOME_FEATURED_LIMIT: u32 = 8;
const HOME_OFFERS_LIMIT: u32 = 12;
const HOME_TESTIMONIALS_LIMIT: u32 = 8;

const CATALOG_COLUMNS: &str =
  "id,name,price,discount,stock,category,subcategory,thumbnail_url,ano,kilometros";
const DETAIL_COLUMNS: &str = "id,name,price,discount,stock,description,image_urls,thumbnail_url,\
  modelo,ano,version,kilometros,combustible,motor,potencia,puertas,transmision,color,condicion,\
  carroceria,traccion,consumo_mixto,vin";
const INVENTORY_COLUMNS: &str =
  "id,name,price,stock,destacado,discount,image_urls,thumbnail_url,created_at";
const FEATURED_COLUMNS: &str = "id,name,price,thumbnail_url,destacado,ano,kilometros";
const OFFER_COLUMNS: &str = "id,name,price,thumbnail_url,discount,ano,kilometros";
const TESTIMONIAL_COLUMNS: &str = "id,nombre,comentario,estrellas,photo_url";
const BANNER_COLUMNS: &str = "id,image_url,order";
const SALE_COLUMNS: &str = "id,fecha,precio_venta,precio_ingreso,total_gastos,rentabilidad,\
  patente,vehiculo_nombre,vendedor_nombre,cliente_nombre,cliente_telefono,notas,metodo_pago,\
  financiacion,permuta";
const EXPENSE_COLUMNS: &str = "id,description,category,amount,date";
const DASHBOARD_VEHICLE_COLUMNS: &str = "id,plate,brand,model,sold,entry_date";
const STOCK_COLUMNS: &str = "id,brand,model,year,plate,linked,sold,purchase_price,entry_date,\
  previous_owner,previous_owner_phone,kilometers";
const CATEGORY_COLUMNS: &str = "id,name,subcategories";
const LEAD_COLUMNS: &str = "id,full_name,phone,vehicle_label,status,notes,created_at";
const LEAD_SEARCH_COLUMNS: [&str; 3] = ["full_name", "vehicle_label", "notes"];

type Params = Vec<(&'static str, String)>;

/// Keys used to authenticate against the backend.
#[derive(Clone)]
pub struct Credentials {
  /// Public project key, sent on every request
  pub api_key: String,
  /// Signed-in user's token; requests fall back to the project key
  pub access_token: Option<String>,
}

/// Row body tagged with its owning dealership.
#[derive(Serialize)]
struct Owned<'a, T> {
  dealership_id: &'a TenantId,
  #[serde(flatten)]
  row: &'a T,
}

#[derive(Deserialize)]
struct SoldVehicleRow {
  vehiculo_id: Option<RowId>,
}

/// Backend client. Clone is cheap, the connection pool is shared.
#[derive(Clone)]
pub struct BackendClient {
  http: Client,
  rest_base: Url,
  credentials: Credentials,
}

impl BackendClient {
  pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, BackendError> {
    let http = Client::builder()
      .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
      .build()?;

    Ok(Self {
      http,
      rest_base: rest_base(base_url)?,
      credentials,
    })
  }

  fn auth_headers(&self) -> Result<header::HeaderMap, BackendError> {
    let invalid = |e: header::InvalidHeaderValue| BackendError::InvalidCredentials(e.to_string());
    let bearer = self
      .credentials
      .access_token
      .as_deref()
      .unwrap_or(&self.credentials.api_key);

    let mut headers = header::HeaderMap::new();
    headers.insert(
      "apikey",
      header::HeaderValue::from_str(&self.credentials.api_key).map_err(invalid)?,
    );
    headers.insert(
      header::AUTHORIZATION,
      header::HeaderValue::from_str(&format!("Bearer {}", bearer)).map_err(invalid)?,
    );
    Ok(headers)
  }

  fn request(&self, method: Method, table: &str) -> Result<RequestBuilder, BackendError> {
    let url = self.rest_base.join(table)?;
    Ok(self.http.request(method, url).headers(self.auth_headers()?))
  }

  /// Check if response is successful, returning an error with body if not.
  async fn check_response(response: Response) -> Result<Response, BackendError> {
    if response.status().is_success() {
      Ok(response)
    } else {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      Err(BackendError::from_status(status, &body))
    }
  }

  async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
  }

  async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
    let response = Self::check_response(request.send().await?).await?;
    Self::read_json(response).await
  }

  // ==========================================================================
  // Generic table access
  // ==========================================================================

  /// Rows of `table` matching PostgREST `params` (`select`, filters, `order`, `limit`).
  pub async fn select<T: DeserializeOwned>(
    &self,
    table: &str,
    params: &[(&str, String)],
  ) -> Result<Vec<T>, BackendError> {
    debug!(table, "select");
    Self::send(self.request(Method::GET, table)?.query(params)).await
  }

  /// Rows `from..=to` plus the total number of matching rows.
  async fn select_range<T: DeserializeOwned>(
    &self,
    table: &str,
    params: &[(&str, String)],
    from: u64,
    to: u64,
  ) -> Result<(Vec<T>, Option<u64>), BackendError> {
    debug!(table, from, to, "select range");
    let request = self
      .request(Method::GET, table)?
      .query(params)
      .header("Prefer", "count=exact")
      .header("Range-Unit", "items")
      .header(header::RANGE, format!("{}-{}", from, to));

    let response = Self::check_response(request.send().await?).await?;
    let total = response
      .headers()
      .get(header::CONTENT_RANGE)
      .and_then(|value| value.to_str().ok())
      .and_then(parse_content_range_total);
    let rows = Self::read_json(response).await?;
    Ok((rows, total))
  }

  /// Insert one row and return the stored representation.
  pub async fn insert<T, B>(
    &self,
    table: &str,
    body: &B,
    columns: &str,
  ) -> Result<Vec<T>, BackendError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    debug!(table, "insert");
    let request = self
      .request(Method::POST, table)?
      .query(&[("select", columns)])
      .header("Prefer", "return=representation")
      .json(body);
    Self::send(request).await
  }

  /// Patch rows matching `filters` and return them.
  pub async fn update<T, B>(
    &self,
    table: &str,
    filters: &[(&str, String)],
    body: &B,
    columns: &str,
  ) -> Result<Vec<T>, BackendError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    debug!(table, "update");
    let request = self
      .request(Method::PATCH, table)?
      .query(filters)
      .query(&[("select", columns)])
      .header("Prefer", "return=representation")
      .json(body);
    Self::send(request).await
  }

  pub async fn delete(&self, table: &str, filters: &[(&str, String)]) -> Result<(), BackendError> {
    debug!(table, "delete");
    let response = self.request(Method::DELETE, table)?.query(filters).send().await?;
    Self::check_response(response).await?;
    Ok(())
  }

  // ==========================================================================
  // Tenant and versions
  // ==========================================================================

  /// Look up a dealership by its public slug.
  pub async fn resolve_dealership(&self, slug: &str) -> Result<Option<Dealership>, BackendError> {
    let params = [
      ("select", "id,name,slug".to_string()),
      ("slug", eq(slug)),
      ("limit", "1".to_string()),
    ];
    let rows: Vec<Dealership> = self.select("dealerships", &params).await?;
    Ok(rows.into_iter().next())
  }

  /// Current remote version of `resource`.
  ///
  /// `None` when the resource has no version column, the tenant has no
  /// versions row, or the column is null.
  pub async fn fetch_version(
    &self,
    tenant: &TenantId,
    resource: &ResourceKey,
  ) -> Result<Option<Version>, BackendError> {
    let Some(column) = version_column(resource) else {
      return Ok(None);
    };

    let params = [
      ("select", column.to_string()),
      ("dealership_id", eq(tenant)),
      ("limit", "1".to_string()),
    ];
    let rows: Vec<Map<String, Value>> = self.select("dealership_versions", &params).await?;
    let version = rows
      .first()
      .and_then(|row| row.get(column))
      .and_then(Value::as_i64);

    debug!(%tenant, %resource, ?version, "remote version");
    Ok(version)
  }

  // ==========================================================================
  // Payload queries
  // ==========================================================================

  /// Public catalog: every vehicle and the category names.
  pub async fn fetch_catalog(&self, tenant: &TenantId) -> Result<Catalog, BackendError> {
    let vehicles_params = owned_params(tenant, CATALOG_COLUMNS);
    let categories_params = owned_params(tenant, "id,name");

    let (vehicles, categories) = futures::try_join!(
      self.select("products", &vehicles_params),
      self.select("categories", &categories_params),
    )?;

    Ok(Catalog {
      vehicles,
      categories,
    })
  }

  pub async fn fetch_vehicle(
    &self,
    tenant: &TenantId,
    id: &str,
  ) -> Result<VehicleDetail, BackendError> {
    let mut params = owned_params(tenant, DETAIL_COLUMNS);
    params.push(("id", eq(id)));
    params.push(("limit", "1".to_string()));

    let rows = self.select("products", &params).await?;
    first_row(rows, "products")
  }

  /// Admin inventory, newest first.
  pub async fn fetch_inventory(
    &self,
    tenant: &TenantId,
  ) -> Result<Vec<InventoryVehicle>, BackendError> {
    let mut params = owned_params(tenant, INVENTORY_COLUMNS);
    params.push(("order", "created_at.desc".to_string()));
    self.select("products", &params).await
  }

  /// Featured vehicles, discounted offers and the latest testimonials.
  pub async fn fetch_home(&self, tenant: &TenantId) -> Result<HomeFeed, BackendError> {
    let mut featured_params = owned_params(tenant, FEATURED_COLUMNS);
    featured_params.push(("destacado", "eq.true".to_string()));
    featured_params.push(("limit", HOME_FEATURED_LIMIT.to_string()));

    let mut offers_params = owned_params(tenant, OFFER_COLUMNS);
    offers_params.push(("discount", "gt.0".to_string()));
    offers_params.push(("limit", HOME_OFFERS_LIMIT.to_string()));

    let mut testimonials_params = owned_params(tenant, TESTIMONIAL_COLUMNS);
    testimonials_params.push(("order", "created_at.desc".to_string()));
    testimonials_params.push(("limit", HOME_TESTIMONIALS_LIMIT.to_string()));

    let (featured, offers, testimonials) = futures::try_join!(
      self.select("products", &featured_params),
      self.select("products", &offers_params),
      self.select("clientes", &testimonials_params),
    )?;

    Ok(HomeFeed {
      featured,
      offers,
      testimonials,
    })
  }

  pub async fn fetch_banners(&self, tenant: &TenantId) -> Result<Vec<Banner>, BackendError> {
    let mut params = owned_params(tenant, BANNER_COLUMNS);
    params.push(("order", "order.asc".to_string()));
    self.select("banners", &params).await
  }

  /// Sales and expenses dated within `month`, plus every vehicle.
  pub async fn fetch_dashboard(
    &self,
    tenant: &TenantId,
    month: YearMonth,
  ) -> Result<DashboardSnapshot, BackendError> {
    let (start, end) = month
      .bounds()
      .ok_or_else(|| BackendError::InvalidResponse(format!("month {} out of range", month)))?;

    let mut sales_params = owned_params(tenant, SALE_COLUMNS);
    sales_params.push(("fecha", format!("gte.{}", start)));
    sales_params.push(("fecha", format!("lt.{}", end)));
    sales_params.push(("order", "fecha.desc".to_string()));

    let mut expenses_params = owned_params(tenant, EXPENSE_COLUMNS);
    expenses_params.push(("date", format!("gte.{}", start)));
    expenses_params.push(("date", format!("lt.{}", end)));
    expenses_params.push(("order", "date.desc".to_string()));

    let vehicles_params = owned_params(tenant, DASHBOARD_VEHICLE_COLUMNS);

    let (sales, expenses, vehicles) = futures::try_join!(
      self.select("ventas", &sales_params),
      self.select("general_expenses", &expenses_params),
      self.select("vehicles", &vehicles_params),
    )?;

    Ok(DashboardSnapshot {
      sales,
      expenses,
      vehicles,
    })
  }

  /// Purchased vehicles, newest first, and the ids already sold.
  pub async fn fetch_stock(&self, tenant: &TenantId) -> Result<StockSnapshot, BackendError> {
    let mut vehicles_params = owned_params(tenant, STOCK_COLUMNS);
    vehicles_params.push(("order", "created_at.desc".to_string()));
    let sales_params = owned_params(tenant, "vehiculo_id");

    let (vehicles, sold): (_, Vec<SoldVehicleRow>) = futures::try_join!(
      self.select("vehicles", &vehicles_params),
      self.select("ventas", &sales_params),
    )?;

    Ok(StockSnapshot {
      vehicles,
      sold_vehicle_ids: sold.into_iter().filter_map(|row| row.vehiculo_id).collect(),
    })
  }

  pub async fn fetch_categories(&self, tenant: &TenantId) -> Result<Vec<Category>, BackendError> {
    let mut params = owned_params(tenant, CATEGORY_COLUMNS);
    params.push(("order", "name.asc".to_string()));
    self.select("categories", &params).await
  }

  /// One page of a seller's leads, newest first.
  pub async fn fetch_leads(&self, query: &LeadsQuery) -> Result<LeadsPage, BackendError> {
    let from = u64::from(query.page.saturating_sub(1)) * LEADS_PAGE_SIZE;
    let to = from + LEADS_PAGE_SIZE - 1;

    let mut params: Params = vec![
      ("select", LEAD_COLUMNS.to_string()),
      ("seller_id", eq(&query.seller_id)),
      ("order", "created_at.desc".to_string()),
    ];
    if let Some(term) = query.search_term() {
      params.push(("or", ilike_filter(term)));
    }

    let (leads, total) = self.select_range("leads", &params, from, to).await?;
    Ok(LeadsPage { leads, total })
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  /// Insert a vehicle. `fields` are product columns.
  pub async fn create_vehicle(
    &self,
    tenant: &TenantId,
    fields: &Map<String, Value>,
  ) -> Result<InventoryVehicle, BackendError> {
    let body = Owned {
      dealership_id: tenant,
      row: fields,
    };
    let rows = self.insert("products", &body, INVENTORY_COLUMNS).await?;
    first_row(rows, "products")
  }

  pub async fn update_vehicle(
    &self,
    tenant: &TenantId,
    id: &RowId,
    changes: &Map<String, Value>,
  ) -> Result<InventoryVehicle, BackendError> {
    let filters = row_filters(tenant, id);
    let rows = self
      .update("products", &filters, changes, INVENTORY_COLUMNS)
      .await?;
    first_row(rows, "products")
  }

  pub async fn delete_vehicle(&self, tenant: &TenantId, id: &RowId) -> Result<(), BackendError> {
    self.delete("products", &row_filters(tenant, id)).await
  }

  /// Record a sale, then mark the sold vehicle.
  pub async fn register_sale(
    &self,
    tenant: &TenantId,
    sale: &NewSale,
  ) -> Result<Sale, BackendError> {
    let body = Owned {
      dealership_id: tenant,
      row: sale,
    };
    let rows = self.insert("ventas", &body, SALE_COLUMNS).await?;
    let stored = first_row(rows, "ventas")?;

    let filters = row_filters(tenant, &sale.vehicle_id);
    let _: Vec<Value> = self
      .update("vehicles", &filters, &json!({ "sold": true }), "id")
      .await?;

    Ok(stored)
  }

  pub async fn create_banner(
    &self,
    tenant: &TenantId,
    image_url: &str,
    order: Option<i64>,
  ) -> Result<Banner, BackendError> {
    let row = json!({ "image_url": image_url, "order": order });
    let body = Owned {
      dealership_id: tenant,
      row: &row,
    };
    let rows = self.insert("banners", &body, BANNER_COLUMNS).await?;
    first_row(rows, "banners")
  }

  pub async fn delete_banner(&self, tenant: &TenantId, id: &RowId) -> Result<(), BackendError> {
    self.delete("banners", &row_filters(tenant, id)).await
  }

  /// New category without subcategories.
  pub async fn create_category(
    &self,
    tenant: &TenantId,
    name: &str,
  ) -> Result<Category, BackendError> {
    let row = json!({ "name": name, "subcategories": [] });
    let body = Owned {
      dealership_id: tenant,
      row: &row,
    };
    let rows = self.insert("categories", &body, CATEGORY_COLUMNS).await?;
    first_row(rows, "categories")
  }

  pub async fn update_lead_status(&self, id: &RowId, status: &str) -> Result<(), BackendError> {
    let filters = [("id", eq(id))];
    let body = json!({ "status": status, "updated_at": Utc::now().to_rfc3339() });
    let _: Vec<Value> = self.update("leads", &filters, &body, "id").await?;
    Ok(())
  }

  pub async fn delete_lead(&self, id: &RowId) -> Result<(), BackendError> {
    self.delete("leads", &[("id", eq(id))]).await
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// REST root for a backend URL, e.g. `https://x.example.co/rest/v1/`.
fn rest_base(base_url: &str) -> Result<Url, url::ParseError> {
  let mut base = Url::parse(base_url)?;
  if !base.path().ends_with('/') {
    let path = format!("{}/", base.path());
    base.set_path(&path);
  }
  base.join("rest/v1/")
}

fn eq(value: impl Display) -> String {
  format!("eq.{}", value)
}

fn owned_params(tenant: &TenantId, columns: &str) -> Params {
  vec![
    ("select", columns.to_string()),
    ("dealership_id", eq(tenant)),
  ]
}

fn row_filters(tenant: &TenantId, id: &RowId) -> Params {
  vec![("id", eq(id)), ("dealership_id", eq(tenant))]
}

fn first_row<T>(rows: Vec<T>, table: &str) -> Result<T, BackendError> {
  rows
    .into_iter()
    .next()
    .ok_or_else(|| BackendError::NotFound(format!("no matching row in {}", table)))
}

/// `or` filter matching `term` anywhere in the searchable lead columns.
///
/// Characters that delimit PostgREST filter lists are dropped from the term.
fn ilike_filter(term: &str) -> String {
  let term: String = term
    .chars()
    .filter(|c| !matches!(c, ',' | '(' | ')' | '*'))
    .collect();
  let clauses: Vec<String> = LEAD_SEARCH_COLUMNS
    .iter()
    .map(|column| format!("{}.ilike.*{}*", column, term))
    .collect();
  format!("({})", clauses.join(","))
}

/// Total from a `Content-Range` header such as `0-9/57` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
  value.rsplit_once('/')?.1.parse().ok()
}
