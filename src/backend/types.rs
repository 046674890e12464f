//! Row and payload types for the dealership backend.
//!
//! Field names follow the backend's columns; Spanish column names are
//! renamed on the Rust side only.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Boolean columns may be null on older rows.
fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Primary key of a backend row, numeric or uuid depending on the table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
  Int(i64),
  Text(String),
}

impl fmt::Display for RowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(id) => write!(f, "{}", id),
      Self::Text(id) => f.write_str(id),
    }
  }
}

impl From<i64> for RowId {
  fn from(id: i64) -> Self {
    Self::Int(id)
  }
}

impl From<&str> for RowId {
  fn from(id: &str) -> Self {
    id.parse().map_or_else(|_| Self::Text(id.to_string()), Self::Int)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dealership {
  pub id: String,
  pub name: String,
  pub slug: String,
}

// ============================================================================
// Vehicles
// ============================================================================

/// Vehicle as listed in the public catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogVehicle {
  pub id: RowId,
  pub name: String,
  pub price: Option<f64>,
  pub discount: Option<f64>,
  pub stock: Option<i64>,
  pub category: Option<String>,
  pub subcategory: Option<String>,
  pub thumbnail_url: Option<String>,
  #[serde(rename = "ano")]
  pub year: Option<i32>,
  #[serde(rename = "kilometros")]
  pub kilometers: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
  pub id: RowId,
  pub name: String,
}

/// Public catalog: vehicles plus the category names used to filter them
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Catalog {
  pub vehicles: Vec<CatalogVehicle>,
  pub categories: Vec<CategoryRef>,
}

/// Vehicle detail page; technical specs vary per listing and are kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDetail {
  pub id: RowId,
  pub name: String,
  pub price: Option<f64>,
  pub discount: Option<f64>,
  pub stock: Option<i64>,
  pub description: Option<String>,
  #[serde(default)]
  pub image_urls: Option<Vec<String>>,
  pub thumbnail_url: Option<String>,
  #[serde(flatten)]
  pub specs: Map<String, Value>,
}

/// Vehicle row as managed from the admin inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryVehicle {
  pub id: RowId,
  pub name: String,
  pub price: Option<f64>,
  pub stock: Option<i64>,
  #[serde(rename = "destacado", default, deserialize_with = "null_as_false")]
  pub featured: bool,
  pub discount: Option<f64>,
  #[serde(default)]
  pub image_urls: Option<Vec<String>>,
  pub thumbnail_url: Option<String>,
  pub created_at: Option<String>,
}

// ============================================================================
// Home and banners
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeVehicle {
  pub id: RowId,
  pub name: String,
  pub price: Option<f64>,
  pub thumbnail_url: Option<String>,
  #[serde(default)]
  pub discount: Option<f64>,
  #[serde(rename = "ano")]
  pub year: Option<i32>,
  #[serde(rename = "kilometros")]
  pub kilometers: Option<i64>,
}

/// Customer testimonial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
  pub id: RowId,
  #[serde(rename = "nombre")]
  pub name: String,
  #[serde(rename = "comentario")]
  pub comment: Option<String>,
  #[serde(rename = "estrellas")]
  pub stars: Option<u8>,
  pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HomeFeed {
  pub featured: Vec<HomeVehicle>,
  pub offers: Vec<HomeVehicle>,
  pub testimonials: Vec<Testimonial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
  pub id: RowId,
  pub image_url: String,
  pub order: Option<i64>,
}

// ============================================================================
// Dashboard and stock
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
  pub id: RowId,
  #[serde(rename = "fecha")]
  pub date: String,
  #[serde(rename = "precio_venta")]
  pub sale_price: Option<f64>,
  #[serde(rename = "precio_ingreso")]
  pub purchase_price: Option<f64>,
  #[serde(rename = "total_gastos")]
  pub total_expenses: Option<f64>,
  #[serde(rename = "rentabilidad")]
  pub profit: Option<f64>,
  #[serde(rename = "patente")]
  pub plate: Option<String>,
  #[serde(rename = "vehiculo_nombre")]
  pub vehicle_name: Option<String>,
  #[serde(rename = "vendedor_nombre")]
  pub seller_name: Option<String>,
  #[serde(rename = "cliente_nombre")]
  pub customer_name: Option<String>,
  #[serde(rename = "cliente_telefono")]
  pub customer_phone: Option<String>,
  #[serde(rename = "notas")]
  pub notes: Option<String>,
  #[serde(rename = "metodo_pago")]
  pub payment_method: Option<String>,
  #[serde(rename = "financiacion", default)]
  pub financing: Option<Value>,
  #[serde(rename = "permuta", default)]
  pub trade_in: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralExpense {
  pub id: RowId,
  pub description: Option<String>,
  pub category: Option<String>,
  pub amount: f64,
  pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardVehicle {
  pub id: RowId,
  pub plate: Option<String>,
  pub brand: Option<String>,
  pub model: Option<String>,
  #[serde(default, deserialize_with = "null_as_false")]
  pub sold: bool,
  pub entry_date: Option<String>,
}

/// Sales, expenses and vehicles behind one month of the financial dashboard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
  pub sales: Vec<Sale>,
  pub expenses: Vec<GeneralExpense>,
  pub vehicles: Vec<DashboardVehicle>,
}

/// Vehicle bought by the dealership, as tracked in stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockVehicle {
  pub id: RowId,
  pub brand: Option<String>,
  pub model: Option<String>,
  pub year: Option<i32>,
  pub plate: Option<String>,
  #[serde(default, deserialize_with = "null_as_false")]
  pub linked: bool,
  #[serde(default, deserialize_with = "null_as_false")]
  pub sold: bool,
  pub purchase_price: Option<f64>,
  pub entry_date: Option<String>,
  pub previous_owner: Option<String>,
  pub previous_owner_phone: Option<String>,
  pub kilometers: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StockSnapshot {
  pub vehicles: Vec<StockVehicle>,
  /// Vehicles that already appear in a sale
  pub sold_vehicle_ids: Vec<RowId>,
}

/// Sale to register against a stock vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSale {
  #[serde(rename = "vehiculo_id")]
  pub vehicle_id: RowId,
  #[serde(rename = "fecha")]
  pub date: String,
  #[serde(rename = "precio_venta")]
  pub sale_price: f64,
  #[serde(rename = "cliente_nombre", skip_serializing_if = "Option::is_none")]
  pub customer_name: Option<String>,
  #[serde(rename = "cliente_telefono", skip_serializing_if = "Option::is_none")]
  pub customer_phone: Option<String>,
  #[serde(rename = "metodo_pago", skip_serializing_if = "Option::is_none")]
  pub payment_method: Option<String>,
  #[serde(rename = "notas", skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

// ============================================================================
// Categories and leads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: RowId,
  pub name: String,
  #[serde(default)]
  pub subcategories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
  pub id: RowId,
  pub full_name: Option<String>,
  pub phone: Option<String>,
  pub vehicle_label: Option<String>,
  pub status: Option<String>,
  pub notes: Option<String>,
  pub created_at: Option<String>,
}

/// One page of leads and the total matching the search
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LeadsPage {
  pub leads: Vec<Lead>,
  pub total: Option<u64>,
}
