//! Cache keys for backend queries.

use crate::cache::{QueryKey, ResourceKey};

/// Column of `dealership_versions` that versions `resource`.
///
/// Resources without a column are not versioned remotely and must use a
/// time-based policy instead.
pub fn version_column(resource: &ResourceKey) -> Option<&'static str> {
  match resource {
    ResourceKey::Vehicles | ResourceKey::Inventory | ResourceKey::Vehicle(_) => {
      Some("vehicles_version")
    }
    ResourceKey::Home => Some("home_version"),
    ResourceKey::Banners => Some("banners_version"),
    ResourceKey::Dashboard(_) => Some("admin_dashboard_version"),
    ResourceKey::Stock => Some("vehicles_stock_version"),
    ResourceKey::Categories | ResourceKey::Custom(_) => None,
  }
}

/// One page of a seller's leads, optionally filtered by a search term
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadsQuery {
  pub seller_id: String,
  /// 1-based
  pub page: u32,
  /// Normalized term, exactly as sent to the backend and used in the key
  search: String,
}

impl LeadsQuery {
  pub fn new(seller_id: impl Into<String>, page: u32, search: impl Into<String>) -> Self {
    Self {
      seller_id: seller_id.into(),
      page: page.max(1),
      search: normalize_search(&search.into()),
    }
  }

  /// Search term as sent to the backend, `None` when blank
  pub fn search_term(&self) -> Option<&str> {
    (!self.search.is_empty()).then_some(self.search.as_str())
  }
}

impl QueryKey for LeadsQuery {
  fn description(&self) -> String {
    format!(
      "leads:{}:{}:{}",
      self.seller_id,
      self.page,
      self.search
    )
  }
}

/// Collapse whitespace and lowercase; `ilike` ignores case anyway.
fn normalize_search(search: &str) -> String {
  search.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
