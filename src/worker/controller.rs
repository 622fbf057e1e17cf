//! Event handlers of the offline cache controller.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheResult, CacheStorage, RequestKey};
use crate::config::Config;
use crate::net::{Network, Request, Response};
use crate::routes::RouteTable;

/// Everything one controller version needs, resolved to absolute URLs.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
  /// Current cache generation name
  pub version: String,
  pub shell_assets: Vec<Url>,
  /// Served when the network is unreachable
  pub shell_document: Url,
  pub routes: RouteTable,
}

impl ControllerSettings {
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.cache.origin)
      .map_err(|e| eyre!("Invalid cache origin '{}': {}", config.cache.origin, e))?;

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid shell asset '{}': {}", path, e))
    };

    Ok(Self {
      version: config.cache.version.clone(),
      shell_assets: config
        .cache
        .shell_assets
        .iter()
        .map(|p| resolve(p))
        .collect::<Result<_>>()?,
      shell_document: resolve(&config.cache.shell_document)?,
      routes: RouteTable::new(&config.routes),
    })
  }
}

/// Outcome of the install phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<String>,
  pub failed: Vec<String>,
}

/// Outcome of the activate phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  /// Stale generations removed
  pub deleted: Vec<String>,
}

/// Install, activate and fetch handlers for one controller version.
pub struct CacheController<S: CacheStorage, N: Network> {
  settings: ControllerSettings,
  storage: Arc<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> CacheController<S, N> {
  pub fn new(settings: ControllerSettings, storage: Arc<S>, network: Arc<N>) -> Self {
    Self {
      settings,
      storage,
      network,
    }
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  /// Open the current generation and pre-populate the shell assets.
  ///
  /// Each asset is fetched independently; a failed asset is logged and
  /// reported but does not abort the others.
  pub async fn on_install(&self) -> Result<InstallReport> {
    self.storage.open_generation(self.version())?;

    let results = join_all(
      self
        .settings
        .shell_assets
        .iter()
        .map(|url| self.add_asset(url)),
    )
    .await;

    let mut report = InstallReport::default();
    for (url, result) in self.settings.shell_assets.iter().zip(results) {
      match result {
        Ok(()) => report.cached.push(url.to_string()),
        Err(e) => {
          warn!(version = self.version(), asset = %url, error = %e, "Failed to cache shell asset");
          report.failed.push(url.to_string());
        }
      }
    }

    info!(
      version = self.version(),
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Installed"
    );
    Ok(report)
  }

  async fn add_asset(&self, url: &Url) -> Result<()> {
    let request = Request::get(url.clone());
    let response = self.network.fetch(&request).await?;
    if !response.is_cacheable() {
      return Err(eyre!(
        "Uncacheable response for {}: status {} ({:?})",
        url,
        response.status,
        response.response_type
      ));
    }
    self
      .storage
      .put_entry(self.version(), &RequestKey::new(&request), &response)
  }

  /// Delete every generation other than the current one.
  pub async fn on_activate(&self) -> Result<ActivateReport> {
    let mut report = ActivateReport::default();

    for generation in self.storage.generations()? {
      if generation.name == self.version() {
        continue;
      }
      if self.storage.delete_generation(&generation.name)? {
        info!(generation = %generation.name, "Deleted stale cache generation");
        report.deleted.push(generation.name);
      }
    }

    info!(version = self.version(), "Activated");
    Ok(report)
  }

  /// Handle an intercepted request: cache first, then network, then the
  /// cached shell when the network is unreachable.
  pub async fn on_fetch(&self, request: &Request) -> Result<CacheResult<Response>> {
    if !request.is_get() || !self.settings.routes.is_cacheable_route(request.url.path()) {
      return self.passthrough(request).await;
    }

    let key = RequestKey::new(request);

    // The cache is consulted opportunistically; a broken store means network only
    match self.storage.match_entry(self.version(), &key) {
      Ok(Some(entry)) => match entry.to_response() {
        Ok(response) => {
          debug!(url = %request.url, "Cache hit");
          return Ok(CacheResult::from_cache(response, entry.cached_at));
        }
        Err(e) => warn!(url = %request.url, error = %e, "Unreadable cache entry"),
      },
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
    }

    let response = match self.network.fetch(request).await {
      Ok(response) => response,
      Err(e) => return self.offline_shell(request, e),
    };

    if !response.is_cacheable() {
      debug!(
        url = %request.url,
        status = response.status,
        response_type = ?response.response_type,
        "Not caching response"
      );
      return Ok(CacheResult::from_network(response));
    }

    let copy = response.clone();
    if let Err(e) = self.storage.put_entry(self.version(), &key, &copy) {
      warn!(url = %request.url, error = %e, "Failed to cache response");
    }

    Ok(CacheResult::from_network(response))
  }

  /// Send a request straight to the network without any caching logic.
  pub async fn passthrough(&self, request: &Request) -> Result<CacheResult<Response>> {
    let response = self.network.fetch(request).await?;
    Ok(CacheResult::passthrough(response))
  }

  fn offline_shell(
    &self,
    request: &Request,
    error: color_eyre::Report,
  ) -> Result<CacheResult<Response>> {
    let shell = Request::get(self.settings.shell_document.clone());
    let entry = match self.storage.match_entry(self.version(), &RequestKey::new(&shell)) {
      Ok(Some(entry)) => entry,
      Ok(None) => return Err(error),
      Err(e) => {
        warn!(error = %e, "Cache lookup for shell document failed");
        return Err(error);
      }
    };

    let response = match entry.to_response() {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, "Unreadable shell document");
        return Err(error);
      }
    };

    info!(url = %request.url, error = %error, "Network unreachable, serving cached shell");
    Ok(CacheResult::offline_shell(response, entry.cached_at))
  }
}
