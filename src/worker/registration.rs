//! Controller registration.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::info;

use super::controller::{CacheController, ControllerSettings};
use super::runtime::WorkerHandle;
use crate::cache::CacheStorage;
use crate::net::Network;

/// Owns the active controller and swaps in new versions.
///
/// Open pages hold a receiver from [`Registrar::subscribe`]; publishing a
/// newly activated controller there is how it takes control of them
/// without a reload.
pub struct Registrar<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  active: watch::Sender<Option<WorkerHandle>>,
  /// Serializes registrations
  lock: Mutex<()>,
}

impl<S: CacheStorage, N: Network> Registrar<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
    let (active, _rx) = watch::channel(None);
    Self {
      storage,
      network,
      active,
      lock: Mutex::new(()),
    }
  }

  #[cfg(test)]
  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn network(&self) -> &Arc<N> {
    &self.network
  }

  /// The controller currently in charge, if any.
  pub fn controller(&self) -> Option<WorkerHandle> {
    self.active.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<Option<WorkerHandle>> {
    self.active.subscribe()
  }

  /// Register the controller for `settings.version`.
  ///
  /// A no-op returning the existing handle when that version is already
  /// active. Otherwise the new version installs and activates (purging
  /// stale generations) before it replaces the previous controller. On
  /// failure the previous controller stays in charge.
  pub async fn register(&self, settings: ControllerSettings) -> Result<WorkerHandle> {
    let _guard = self.lock.lock().await;

    let current = self.controller();
    if let Some(current) = current {
      if current.version() == settings.version && current.state().is_active() {
        return Ok(current);
      }
    }

    let version = settings.version.clone();
    let worker = WorkerHandle::spawn(CacheController::new(
      settings,
      Arc::clone(&self.storage),
      Arc::clone(&self.network),
    ));

    if let Err(e) = worker.install().await {
      worker.retire();
      return Err(e);
    }
    let activated = match worker.activate().await {
      Ok(report) => report,
      Err(e) => {
        worker.retire();
        return Err(e);
      }
    };

    if let Some(previous) = self.active.send_replace(Some(worker.clone())) {
      info!(from = previous.version(), to = %version, "Replacing controller");
      previous.retire();
    }
    info!(version = %version, purged = ?activated.deleted, "Controller registered");

    Ok(worker)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::config::Config;
  use crate::net::fake::FakeNetwork;
  use crate::net::Request;
  use crate::worker::WorkerState;

  fn registrar() -> Registrar<SqliteStorage, FakeNetwork> {
    let network = FakeNetwork::new("http://localhost:3000");
    network.serve("/index.html", 200, "<shell>");
    network.serve("/manifest.json", 200, "{}");
    Registrar::new(
      Arc::new(SqliteStorage::open_in_memory().unwrap()),
      Arc::new(network),
    )
  }

  fn settings(version: &str) -> ControllerSettings {
    let mut config = Config::default();
    config.cache.version = version.to_string();
    config.cache.shell_assets = vec!["/index.html".to_string(), "/manifest.json".to_string()];
    ControllerSettings::from_config(&config).unwrap()
  }

  fn generation_names(registrar: &Registrar<SqliteStorage, FakeNetwork>) -> Vec<String> {
    registrar
      .storage()
      .generations()
      .unwrap()
      .into_iter()
      .map(|g| g.name)
      .collect()
  }

  #[tokio::test]
  async fn test_register_is_idempotent() {
    let registrar = registrar();
    let first = registrar.register(settings("v1")).await.unwrap();
    let calls = registrar.network().total_calls();

    let second = registrar.register(settings("v1")).await.unwrap();
    assert_eq!(second.version(), "v1");
    assert_eq!(first.state(), WorkerState::Activated);
    // No second install
    assert_eq!(registrar.network().total_calls(), calls);
  }

  #[tokio::test]
  async fn test_concurrent_registration_installs_once() {
    let registrar = registrar();
    let (a, b) = tokio::join!(
      registrar.register(settings("v1")),
      registrar.register(settings("v1"))
    );
    a.unwrap();
    b.unwrap();
    // Two shell assets, fetched once
    assert_eq!(registrar.network().total_calls(), 2);
  }

  #[tokio::test]
  async fn test_new_version_purges_and_replaces() {
    let registrar = registrar();
    let mut page = registrar.subscribe();

    let v0 = registrar.register(settings("v0")).await.unwrap();
    assert_eq!(generation_names(&registrar), vec!["v0"]);

    let v1 = registrar.register(settings("v1")).await.unwrap();
    assert_eq!(generation_names(&registrar), vec!["v1"]);

    v0.stopped().await;
    assert_eq!(v0.state(), WorkerState::Redundant);
    assert_eq!(v1.state(), WorkerState::Activated);

    // Already-open page sees the new controller
    assert!(page.has_changed().unwrap());
    let claimed = page.borrow_and_update().clone().unwrap();
    assert_eq!(claimed.version(), "v1");
  }

  #[tokio::test]
  async fn test_claimed_controller_serves_fetches() {
    let registrar = registrar();
    let page = registrar.subscribe();
    registrar.register(settings("v1")).await.unwrap();

    let controller = page.borrow().clone().unwrap();
    registrar.network().set_offline(true);
    let url = registrar.network().url("/master/user/occupant-users/view/1");
    let result = controller.fetch(Request::get(url)).await.unwrap();
    assert_eq!(result.source, CacheSource::OfflineShell);
  }
}
