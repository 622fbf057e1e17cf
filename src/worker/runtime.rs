//! Event loop running one controller version on its own task.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::controller::{ActivateReport, CacheController, InstallReport};
use super::lifecycle::WorkerState;
use crate::cache::{CacheResult, CacheStorage};
use crate::net::{Network, Request, Response};

type FetchReply = oneshot::Sender<Result<CacheResult<Response>>>;

/// Events delivered to a controller.
pub enum WorkerEvent {
  Install {
    reply: oneshot::Sender<Result<InstallReport>>,
  },
  Activate {
    reply: oneshot::Sender<Result<ActivateReport>>,
  },
  Fetch {
    request: Request,
    reply: FetchReply,
  },
  /// Superseded by a newer version; stop handling events
  Retire,
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct WorkerHandle {
  version: String,
  tx: mpsc::UnboundedSender<WorkerEvent>,
  state: watch::Receiver<WorkerState>,
}

impl std::fmt::Debug for WorkerHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WorkerHandle")
      .field("version", &self.version)
      .field("state", &*self.state.borrow())
      .finish_non_exhaustive()
  }
}

impl WorkerHandle {
  /// Spawn the event loop for `controller` on the current runtime.
  pub fn spawn<S: CacheStorage, N: Network>(controller: CacheController<S, N>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(WorkerState::Parsed);
    let version = controller.version().to_string();

    tokio::spawn(run(Arc::new(controller), rx, state_tx));

    Self {
      version,
      tx,
      state: state_rx,
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn state(&self) -> WorkerState {
    *self.state.borrow()
  }

  fn send(&self, event: WorkerEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Controller {} is no longer running", self.version))
  }

  async fn request<T>(
    &self,
    make: impl FnOnce(oneshot::Sender<Result<T>>) -> WorkerEvent,
  ) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    self.send(make(reply))?;
    rx.await
      .map_err(|_| eyre!("Controller {} dropped the event", self.version))?
  }

  pub async fn install(&self) -> Result<InstallReport> {
    self.request(|reply| WorkerEvent::Install { reply }).await
  }

  pub async fn activate(&self) -> Result<ActivateReport> {
    self.request(|reply| WorkerEvent::Activate { reply }).await
  }

  pub async fn fetch(&self, request: Request) -> Result<CacheResult<Response>> {
    self
      .request(|reply| WorkerEvent::Fetch { request, reply })
      .await
  }

  /// Whether both handles drive the same running controller.
  pub fn same_worker(&self, other: &WorkerHandle) -> bool {
    self.tx.same_channel(&other.tx)
  }

  /// Mark redundant and stop the loop. In-flight fetches still complete.
  pub fn retire(&self) {
    // Already stopped is fine
    let _ = self.send(WorkerEvent::Retire);
  }

  /// Wait until the controller reaches `Redundant` or its loop exits.
  #[cfg(test)]
  pub async fn stopped(&self) {
    let mut state = self.state.clone();
    let _ = state.wait_for(|s| *s == WorkerState::Redundant).await;
  }
}

fn transition(state: &watch::Sender<WorkerState>, version: &str, next: WorkerState) -> Result<()> {
  let current = *state.borrow();
  if !current.can_transition_to(next) {
    return Err(eyre!(
      "Controller {} cannot move from {} to {}",
      version,
      current,
      next
    ));
  }
  debug!(version, from = %current, to = %next, "Lifecycle transition");
  state.send_replace(next);
  Ok(())
}

/// Install and activate run inline, so a fetch queued behind an activation
/// is only dispatched once stale generations are gone. Fetches run on
/// their own tasks and are not ordered against each other.
async fn run<S: CacheStorage, N: Network>(
  controller: Arc<CacheController<S, N>>,
  mut rx: mpsc::UnboundedReceiver<WorkerEvent>,
  state: watch::Sender<WorkerState>,
) {
  let version = controller.version().to_string();

  while let Some(event) = rx.recv().await {
    match event {
      WorkerEvent::Install { reply } => {
        let current = *state.borrow();
        match current {
          WorkerState::Parsed => {}
          WorkerState::Redundant => {
            let _ = reply.send(Err(eyre!("Controller {} is redundant", version)));
            continue;
          }
          _ => {
            debug!(version, state = %current, "Install already handled");
            let _ = reply.send(Ok(InstallReport::default()));
            continue;
          }
        }

        let _ = transition(&state, &version, WorkerState::Installing);
        let result = controller.on_install().await;
        let next = if result.is_ok() {
          WorkerState::Installed
        } else {
          WorkerState::Redundant
        };
        let _ = transition(&state, &version, next);
        let _ = reply.send(result);
      }

      WorkerEvent::Activate { reply } => {
        if let Err(e) = transition(&state, &version, WorkerState::Activating) {
          let _ = reply.send(Err(e));
          continue;
        }
        let result = controller.on_activate().await;
        let next = if result.is_ok() {
          WorkerState::Activated
        } else {
          WorkerState::Redundant
        };
        let _ = transition(&state, &version, next);
        let _ = reply.send(result);
      }

      WorkerEvent::Fetch { request, reply } => {
        let controller = Arc::clone(&controller);
        let active = state.borrow().is_active();
        tokio::spawn(async move {
          let result = if active {
            controller.on_fetch(&request).await
          } else {
            // Not controlling yet: behave as if no controller were present
            controller.passthrough(&request).await
          };
          let _ = reply.send(result);
        });
      }

      WorkerEvent::Retire => break,
    }
  }

  let _ = transition(&state, &version, WorkerState::Redundant);
  info!(version, "Controller stopped");
  if !rx.is_empty() {
    warn!(version, pending = rx.len(), "Dropping events queued after retirement");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::config::Config;
  use crate::net::fake::FakeNetwork;
  use crate::worker::ControllerSettings;

  fn spawn(version: &str) -> (WorkerHandle, Arc<FakeNetwork>) {
    let network = Arc::new(FakeNetwork::new("http://localhost:3000"));
    network.serve("/index.html", 200, "<shell>");
    let mut config = Config::default();
    config.cache.version = version.to_string();
    config.cache.shell_assets = vec!["/index.html".to_string()];
    let controller = CacheController::new(
      ControllerSettings::from_config(&config).unwrap(),
      Arc::new(SqliteStorage::open_in_memory().unwrap()),
      Arc::clone(&network),
    );
    (WorkerHandle::spawn(controller), network)
  }

  #[tokio::test]
  async fn test_lifecycle_through_handle() {
    let (worker, _network) = spawn("v1");
    assert_eq!(worker.state(), WorkerState::Parsed);

    let report = worker.install().await.unwrap();
    assert_eq!(report.cached.len(), 1);
    assert_eq!(worker.state(), WorkerState::Installed);

    worker.activate().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Activated);

    // Second install is a no-op
    assert_eq!(worker.install().await.unwrap(), InstallReport::default());
    assert_eq!(worker.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_activate_before_install_is_rejected() {
    let (worker, _network) = spawn("v1");
    assert!(worker.activate().await.is_err());
    assert_eq!(worker.state(), WorkerState::Parsed);
  }

  #[tokio::test]
  async fn test_fetch_before_activation_is_not_intercepted() {
    let (worker, network) = spawn("v1");
    let url = network.url("/master/user/occupant-users");
    network.serve(url.path(), 200, "list");

    let result = worker.fetch(Request::get(url.clone())).await.unwrap();
    assert_eq!(result.source, CacheSource::Passthrough);

    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    assert_eq!(
      worker.fetch(Request::get(url.clone())).await.unwrap().source,
      CacheSource::Network
    );
    assert_eq!(
      worker.fetch(Request::get(url)).await.unwrap().source,
      CacheSource::Cache
    );
  }

  #[tokio::test]
  async fn test_fetch_queued_behind_activation_is_intercepted() {
    let (worker, network) = spawn("v1");
    worker.install().await.unwrap();
    network.set_offline(true);

    // Queue both without awaiting the activation first
    let activate = worker.activate();
    let fetch = worker.fetch(Request::get(network.url("/master/user/occupant-users/1")));
    let (activated, fetched) = tokio::join!(activate, fetch);

    activated.unwrap();
    assert_eq!(fetched.unwrap().source, CacheSource::OfflineShell);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_resolve_independently() {
    let (worker, network) = spawn("v1");
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let fetches = (0..8).map(|i| {
      let worker = worker.clone();
      let url = network.url(&format!("/master/user/occupant-users/view/{}", i));
      network.serve(url.path(), 200, &format!("occupant {}", i));
      async move { worker.fetch(Request::get(url)).await }
    });

    let results = futures::future::join_all(fetches).await;
    for (i, result) in results.into_iter().enumerate() {
      assert_eq!(result.unwrap().data.body, format!("occupant {}", i).into_bytes());
    }
  }

  #[tokio::test]
  async fn test_retired_worker_rejects_events() {
    let (worker, _network) = spawn("v1");
    worker.retire();
    worker.stopped().await;

    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(worker.install().await.is_err());
  }
}
