//! Per-navigation session gate.

use tracing::debug;
use url::form_urlencoded;

use super::store::SessionStore;
use crate::routes::Location;

/// Gate state. Starts `Unknown` and settles synchronously on each check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  Unknown,
  Authenticated,
  Unauthenticated,
}

/// What the page should render for the current navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
  /// Check not yet settled; show a placeholder, never content
  Loading,
  Render,
  /// Send the user to the login flow, carrying the requested location
  Redirect { to: String },
}

pub struct SessionGate<S: SessionStore> {
  store: S,
  login_path: String,
  state: GateState,
  /// Path the current state was computed for
  checked_path: Option<String>,
}

impl<S: SessionStore> SessionGate<S> {
  pub fn new(store: S, login_path: impl Into<String>) -> Self {
    Self {
      store,
      login_path: login_path.into(),
      state: GateState::Unknown,
      checked_path: None,
    }
  }

  pub fn state(&self) -> GateState {
    self.state
  }

  /// Read the session store. Any anomaly counts as unauthenticated.
  pub fn check_session(&self) -> bool {
    self.store.read().is_some()
  }

  /// Decide for `location`, re-reading the session when the path differs
  /// from the last check.
  pub fn navigate(&mut self, location: &Location) -> GateDecision {
    if self.checked_path.as_deref() != Some(location.path.as_str()) {
      self.state = GateState::Unknown;
      self.checked_path = Some(location.path.clone());
      self.settle();
    }
    self.decision(location)
  }

  fn settle(&mut self) {
    self.state = if self.check_session() {
      GateState::Authenticated
    } else {
      GateState::Unauthenticated
    };
    debug!(state = ?self.state, path = ?self.checked_path, "Session checked");
  }

  /// Decision for the current state without touching the store.
  pub fn decision(&self, location: &Location) -> GateDecision {
    match self.state {
      GateState::Unknown => GateDecision::Loading,
      GateState::Authenticated => GateDecision::Render,
      GateState::Unauthenticated => GateDecision::Redirect {
        to: self.login_redirect(location),
      },
    }
  }

  fn login_redirect(&self, location: &Location) -> String {
    let encoded: String = form_urlencoded::byte_serialize(location.href().as_bytes()).collect();
    format!("{}?redirect={}", self.login_path, encoded)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct FakeStore {
    session: Mutex<Option<Session>>,
    reads: AtomicUsize,
  }

  impl FakeStore {
    fn set(&self, session: Option<Session>) {
      *self.session.lock().unwrap() = session;
    }
  }

  impl SessionStore for FakeStore {
    fn read(&self) -> Option<Session> {
      self.reads.fetch_add(1, Ordering::SeqCst);
      self.session.lock().unwrap().clone()
    }
  }

  fn session() -> Session {
    Session {
      user: json!({"id": 1}),
      token: "abc".to_string(),
    }
  }

  fn loc(path: &str, search: &str) -> Location {
    Location {
      path: path.to_string(),
      search: search.to_string(),
      hash: String::new(),
    }
  }

  #[test]
  fn test_unknown_renders_loading() {
    let gate = SessionGate::new(FakeStore::default(), "/login");
    assert_eq!(gate.state(), GateState::Unknown);
    assert_eq!(gate.decision(&loc("/dashboard", "")), GateDecision::Loading);
  }

  #[test]
  fn test_no_session_redirects_with_return_location() {
    let mut gate = SessionGate::new(FakeStore::default(), "/login");
    let decision = gate.navigate(&loc("/assets/list", "page=2"));
    assert_eq!(gate.state(), GateState::Unauthenticated);
    assert_eq!(
      decision,
      GateDecision::Redirect {
        to: "/login?redirect=%2Fassets%2Flist%3Fpage%3D2".to_string()
      }
    );
  }

  #[test]
  fn test_session_renders() {
    let store = FakeStore::default();
    store.set(Some(session()));
    let mut gate = SessionGate::new(store, "/login");
    assert_eq!(gate.navigate(&loc("/dashboard", "")), GateDecision::Render);
    assert_eq!(gate.state(), GateState::Authenticated);
  }

  #[test]
  fn test_rechecks_on_path_change() {
    let store = Arc::new(FakeStore::default());
    store.set(Some(session()));
    let mut gate = SessionGate::new(Arc::clone(&store), "/login");

    assert_eq!(gate.navigate(&loc("/dashboard", "")), GateDecision::Render);
    // Same path: no re-read
    assert_eq!(gate.navigate(&loc("/dashboard", "tab=2")), GateDecision::Render);
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);

    // Session cleared mid-lifetime
    store.set(None);
    assert!(matches!(
      gate.navigate(&loc("/tickets", "")),
      GateDecision::Redirect { .. }
    ));
    assert_eq!(store.reads.load(Ordering::SeqCst), 2);
  }
}
