//! Result metadata for controller fetches.

use chrono::{DateTime, Utc};

/// Result from a controller fetch, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network on an intercepted route.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Data served from the current cache generation.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// The application shell, served because the network is unreachable.
  pub fn offline_shell(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::OfflineShell,
      cached_at: Some(cached_at),
    }
  }

  /// A request the controller did not intercept.
  pub fn passthrough(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Passthrough,
      cached_at: None,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Network, on an intercepted route
  Network,
  /// Current cache generation
  Cache,
  /// Offline fallback to the cached shell document
  OfflineShell,
  /// Not intercepted; straight to the network
  Passthrough,
}

impl std::fmt::Display for CacheSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::OfflineShell => "offline-shell",
      Self::Passthrough => "passthrough",
    };
    f.write_str(s)
  }
}
