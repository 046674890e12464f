//! Cacheable resources, their aliases and autocomplete logic

use crate::cache::{ParseResourceError, ResourceKey, YearMonth};

#[derive(Debug, Clone)]
pub struct Resource {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All resources the CLI can show or invalidate
pub const RESOURCES: &[Resource] = &[
  Resource {
    name: "vehicles",
    aliases: &["v", "catalog"],
    description: "Public catalog with categories",
  },
  Resource {
    name: "vehicle",
    aliases: &["detail"],
    description: "One vehicle's detail page (vehicle:<id>)",
  },
  Resource {
    name: "inventory",
    aliases: &["i", "inv"],
    description: "Admin vehicle list",
  },
  Resource {
    name: "home",
    aliases: &["h"],
    description: "Featured vehicles, offers and testimonials",
  },
  Resource {
    name: "banners",
    aliases: &["b", "banner"],
    description: "Home page banners",
  },
  Resource {
    name: "stock",
    aliases: &["s"],
    description: "Purchased vehicles and sold ids",
  },
  Resource {
    name: "dashboard",
    aliases: &["d", "dash"],
    description: "Monthly sales and expenses (dashboard:<YYYY-MM>)",
  },
  Resource {
    name: "categories",
    aliases: &["c", "cat"],
    description: "Vehicle categories, cached for a fixed time",
  },
];

/// How well `input` (already lowercase) names `res`; lower is better.
///
/// Exact name, exact alias, name prefix, alias prefix, name substring,
/// alias substring.
fn rank(res: &Resource, input: &str) -> Option<u32> {
  let tiers: [(bool, bool); 3] = [
    (res.name == input, res.aliases.contains(&input)),
    (
      res.name.starts_with(input),
      res.aliases.iter().any(|a| a.starts_with(input)),
    ),
    (
      res.name.contains(input),
      res.aliases.iter().any(|a| a.contains(input)),
    ),
  ];

  (0u32..)
    .zip(tiers)
    .find_map(|(tier, (by_name, by_alias))| match (by_name, by_alias) {
      (true, _) => Some(tier * 2),
      (false, true) => Some(tier * 2 + 1),
      _ => None,
    })
}

/// Resources matching partial input, best first. Empty input lists all.
pub fn get_suggestions(input: &str) -> Vec<&'static Resource> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return RESOURCES.iter().collect();
  }

  let mut ranked: Vec<(u32, &'static Resource)> = RESOURCES
    .iter()
    .filter_map(|res| rank(res, &input).map(|r| (r, res)))
    .collect();
  ranked.sort_by_key(|(r, _)| *r);
  ranked.into_iter().map(|(_, res)| res).collect()
}

/// Names of known resources close to the name part of `input`, for error
/// hints. Nothing is suggested for blank input.
pub fn did_you_mean(input: &str) -> Vec<&'static str> {
  let head = input.split_once(':').map_or(input, |(head, _)| head).trim();
  if head.is_empty() {
    return Vec::new();
  }
  get_suggestions(head).into_iter().map(|res| res.name).collect()
}

/// Resolve user input such as `dash`, `d:2026-03` or `vehicle:42` to a key.
///
/// A name or alias must match exactly. Dashboards without a month use
/// `month`. Unknown names become custom keys.
pub fn resolve(input: &str, month: YearMonth) -> Result<ResourceKey, ParseResourceError> {
  let input = input.trim();
  let (head, arg) = match input.split_once(':') {
    Some((head, arg)) => (head, Some(arg)),
    None => (input, None),
  };

  let head_lower = head.to_lowercase();
  let known = RESOURCES
    .iter()
    .find(|res| res.name == head_lower || res.aliases.contains(&head_lower.as_str()));

  let Some(res) = known else {
    return input.parse();
  };

  match (res.name, arg) {
    ("dashboard", None) => Ok(ResourceKey::Dashboard(month)),
    (name, Some(arg)) => format!("{}:{}", name, arg).parse(),
    (name, None) => name.parse(),
  }
}
