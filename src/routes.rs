//! Route classification.
//!
//! Maps a navigation location onto the route categories that drive offline
//! caching, the mobile layout and the session gate. Matching is plain
//! substring containment: a rule `/a/b` matches `/x/a/b/y`.

use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::config::RoutesConfig;

/// Category a route rule assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RouteCategory {
  /// Served through the offline cache controller
  PwaCacheable,
  /// Rendered without navigation chrome
  MobileOnly,
  /// Exempt from the session gate (login, password reset, ...)
  AuthExempt,
}

/// A single pattern plus the category it tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
  pub pattern: String,
  pub category: RouteCategory,
}

impl RouteRule {
  pub fn matches(&self, path: &str) -> bool {
    path.contains(self.pattern.as_str())
  }
}

/// The current navigation target split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub path: String,
  /// Query string without the leading `?`
  pub search: String,
  /// Fragment without the leading `#`
  pub hash: String,
}

impl Location {
  /// Parse a path (`/a?b=1#c`) or an absolute URL, resolving relative
  /// input against `origin`.
  pub fn parse(input: &str, origin: &Url) -> Result<Self> {
    let url = origin
      .join(input)
      .map_err(|e| eyre!("Failed to parse location '{}': {}", input, e))?;
    Ok(Self::from_url(&url))
  }

  pub fn from_url(url: &Url) -> Self {
    Self {
      path: url.path().to_string(),
      search: url.query().unwrap_or_default().to_string(),
      hash: url.fragment().unwrap_or_default().to_string(),
    }
  }

  /// Path, query and fragment joined back together, as used for redirects.
  pub fn href(&self) -> String {
    let mut href = self.path.clone();
    if !self.search.is_empty() {
      href.push('?');
      href.push_str(&self.search);
    }
    if !self.hash.is_empty() {
      href.push('#');
      href.push_str(&self.hash);
    }
    href
  }
}

/// Categories that apply to one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteClass {
  pub cacheable: bool,
  pub mobile_only: bool,
  pub protected: bool,
}

/// Immutable route tables, built once from configuration.
#[derive(Debug, Clone)]
pub struct RouteTable {
  rules: Vec<RouteRule>,
  mobile_markers: Vec<String>,
  login_path: String,
}

impl RouteTable {
  pub fn new(config: &RoutesConfig) -> Self {
    let tagged = |patterns: &[String], category: RouteCategory| {
      patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(move |p| RouteRule {
          pattern: p.clone(),
          category,
        })
        .collect::<Vec<_>>()
    };

    let mut rules = tagged(&config.pwa, RouteCategory::PwaCacheable);
    rules.extend(tagged(&config.mobile_only, RouteCategory::MobileOnly));
    rules.extend(tagged(&config.auth_exempt, RouteCategory::AuthExempt));

    Self {
      rules,
      mobile_markers: config
        .mobile_markers
        .iter()
        .filter(|m| !m.is_empty())
        .cloned()
        .collect(),
      login_path: config.login_path.clone(),
    }
  }

  pub fn login_path(&self) -> &str {
    &self.login_path
  }

  fn any_match(&self, category: RouteCategory, path: &str) -> bool {
    self
      .rules
      .iter()
      .any(|rule| rule.category == category && rule.matches(path))
  }

  /// True iff `path` contains any configured PWA route.
  pub fn is_cacheable_route(&self, path: &str) -> bool {
    self.any_match(RouteCategory::PwaCacheable, path)
  }

  /// True iff `path` contains a mobile-only route or `search` carries a
  /// mobile marker token.
  pub fn is_mobile_only_route(&self, path: &str, search: &str) -> bool {
    self.any_match(RouteCategory::MobileOnly, path)
      || self
        .mobile_markers
        .iter()
        .any(|marker| search.contains(marker.as_str()))
  }

  /// Everything not explicitly exempted requires a session.
  pub fn is_protected_route(&self, path: &str) -> bool {
    !self.any_match(RouteCategory::AuthExempt, path)
  }

  pub fn classify(&self, location: &Location) -> RouteClass {
    RouteClass {
      cacheable: self.is_cacheable_route(&location.path),
      mobile_only: self.is_mobile_only_route(&location.path, &location.search),
      protected: self.is_protected_route(&location.path),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> RouteTable {
    RouteTable::new(&RoutesConfig::default())
  }

  fn origin() -> Url {
    Url::parse("http://localhost:3000").unwrap()
  }

  #[test]
  fn test_cacheable_is_substring_match() {
    let routes = table();
    assert!(routes.is_cacheable_route("/master/user/occupant-users/view/99"));
    assert!(routes.is_cacheable_route("/master/user/occupant-users"));
    assert!(!routes.is_cacheable_route("/master/user"));
    assert!(!routes.is_cacheable_route("/dashboard"));
  }

  #[test]
  fn test_substring_matches_anywhere_in_path() {
    let config = RoutesConfig {
      pwa: vec!["/a/b".to_string()],
      ..RoutesConfig::default()
    };
    let routes = RouteTable::new(&config);
    assert!(routes.is_cacheable_route("/x/a/b/y"));
    assert!(!routes.is_cacheable_route("/a/x/b"));
  }

  #[test]
  fn test_mobile_only_by_path_or_marker() {
    let routes = table();
    assert!(routes.is_mobile_only_route("/mobile/tickets", ""));
    assert!(routes.is_mobile_only_route("/dashboard", "adminLogin=true"));
    assert!(!routes.is_mobile_only_route("/dashboard", "tab=assets"));
  }

  #[test]
  fn test_protected_unless_exempt() {
    let routes = table();
    assert!(routes.is_protected_route("/dashboard"));
    assert!(routes.is_protected_route("/"));
    assert!(!routes.is_protected_route("/login"));
    assert!(!routes.is_protected_route("/forgot-password"));
  }

  #[test]
  fn test_empty_patterns_are_ignored() {
    let config = RoutesConfig {
      pwa: vec![String::new()],
      mobile_markers: vec![String::new()],
      ..RoutesConfig::default()
    };
    let routes = RouteTable::new(&config);
    assert!(!routes.is_cacheable_route("/anything"));
    assert!(!routes.is_mobile_only_route("/dashboard", "x=1"));
  }

  #[test]
  fn test_location_parse_relative_and_absolute() {
    let loc = Location::parse("/assets/list?page=2#top", &origin()).unwrap();
    assert_eq!(loc.path, "/assets/list");
    assert_eq!(loc.search, "page=2");
    assert_eq!(loc.hash, "top");
    assert_eq!(loc.href(), "/assets/list?page=2#top");

    let loc = Location::parse("https://fm.example.com/tickets", &origin()).unwrap();
    assert_eq!(loc.path, "/tickets");
    assert!(loc.search.is_empty());
    assert_eq!(loc.href(), "/tickets");
  }

  #[test]
  fn test_classify_unmatched_defaults() {
    let routes = table();
    let loc = Location::parse("/inventory", &origin()).unwrap();
    assert_eq!(
      routes.classify(&loc),
      RouteClass {
        cacheable: false,
        mobile_only: false,
        protected: true,
      }
    );
  }
}
