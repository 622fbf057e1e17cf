//! Page-side navigation handling.
//!
//! On every navigation the page classifies the location, picks a layout,
//! runs the session gate and, on cacheable routes, makes sure the offline
//! cache controller is registered.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheResult, CacheStorage};
use crate::config::Config;
use crate::device::{DeviceWatch, ViewportClass};
use crate::net::{Network, Request, Response};
use crate::routes::{Location, RouteClass, RouteTable};
use crate::session::{GateDecision, GateState, SessionGate, SessionStore};
use crate::worker::{ControllerSettings, Registrar, WorkerHandle, WorkerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
  /// Desktop layout with navigation chrome
  Full,
  /// Reduced PWA layout without navigation chrome
  Mobile,
}

impl Layout {
  pub fn for_route(route: &RouteClass, viewport: ViewportClass) -> Self {
    if route.mobile_only || (route.cacheable && viewport == ViewportClass::Mobile) {
      Layout::Mobile
    } else {
      Layout::Full
    }
  }
}

/// Everything decided for one navigation.
#[derive(Debug, Clone)]
pub struct Navigation {
  pub location: Location,
  pub route: RouteClass,
  pub viewport: ViewportClass,
  pub layout: Layout,
  pub session: GateState,
  pub decision: GateDecision,
  /// Version of the controller in charge of this page, if any
  pub controller: Option<String>,
}

pub struct Page<S: CacheStorage, N: Network> {
  origin: Url,
  routes: RouteTable,
  settings: ControllerSettings,
  gate: SessionGate<Arc<dyn SessionStore>>,
  device: DeviceWatch,
  registrar: Arc<Registrar<S, N>>,
  controller: watch::Receiver<Option<WorkerHandle>>,
}

impl<S: CacheStorage, N: Network> Page<S, N> {
  pub fn mount(
    config: &Config,
    session: Arc<dyn SessionStore>,
    device: DeviceWatch,
    registrar: Arc<Registrar<S, N>>,
  ) -> Result<Self> {
    let origin = Url::parse(&config.cache.origin)
      .map_err(|e| eyre!("Invalid cache origin '{}': {}", config.cache.origin, e))?;
    let routes = RouteTable::new(&config.routes);
    let gate = SessionGate::new(session, routes.login_path());

    Ok(Self {
      origin,
      routes,
      settings: ControllerSettings::from_config(config)?,
      gate,
      device,
      controller: registrar.subscribe(),
      registrar,
    })
  }

  pub async fn navigate(&mut self, target: &str) -> Result<Navigation> {
    let location = Location::parse(target, &self.origin)?;
    let route = self.routes.classify(&location);
    let viewport = self.device.class();
    let layout = Layout::for_route(&route, viewport);

    // Every navigation goes through the gate so a path change always
    // re-reads the session, exempt routes included
    let gated = self.gate.navigate(&location);
    let decision = if route.protected {
      gated
    } else {
      GateDecision::Render
    };
    let session = self.gate.state();

    if route.cacheable {
      // Offline support is best effort; the page works without it
      if let Err(e) = self.registrar.register(self.settings.clone()).await {
        warn!(error = %e, "Failed to register offline cache controller");
      }
    }

    let controller = self
      .controller
      .borrow()
      .as_ref()
      .map(|c| c.version().to_string());

    debug!(
      path = %location.path,
      ?route,
      ?viewport,
      ?layout,
      ?session,
      ?decision,
      "Navigated"
    );

    Ok(Navigation {
      location,
      route,
      viewport,
      layout,
      session,
      decision,
      controller,
    })
  }

  /// Issue a request the way the page would: through the controller in
  /// charge, or straight to the network when there is none.
  pub async fn fetch(&self, request: Request) -> Result<CacheResult<Response>> {
    let controller = self.controller.borrow().clone();
    match controller {
      Some(controller) => self.fetch_through(controller, request).await,
      None => {
        let response = self.registrar.network().fetch(&request).await?;
        Ok(CacheResult::passthrough(response))
      }
    }
  }

  /// Fetch through `controller`. If it was retired while the request was
  /// on its way, retry once on the controller now in charge.
  async fn fetch_through(
    &self,
    controller: WorkerHandle,
    request: Request,
  ) -> Result<CacheResult<Response>> {
    let result = controller.fetch(request.clone()).await;
    if result.is_err() && controller.state() == WorkerState::Redundant {
      let current = self.controller.borrow().clone();
      if let Some(current) = current.filter(|c| !c.same_worker(&controller)) {
        debug!(
          from = controller.version(),
          to = current.version(),
          "Retrying fetch on the controller in charge"
        );
        return current.fetch(request).await;
      }
    }
    result
  }

  /// Resolve a path or URL against the application origin.
  pub fn url(&self, target: &str) -> Result<Url> {
    self
      .origin
      .join(target)
      .map_err(|e| eyre!("Invalid URL '{}': {}", target, e))
  }
}
