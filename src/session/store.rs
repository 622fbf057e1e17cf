//! Session store trait and the file-backed client storage implementation.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::SessionConfig;

/// A session derived from persisted client storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
  /// Opaque user-identity record; never inspected beyond being an object
  pub user: Value,
  pub token: String,
}

/// Read-only view of the persisted session.
///
/// Implementations must fail closed: any missing or malformed record is
/// reported as `None`, never as an error.
pub trait SessionStore: Send + Sync {
  fn read(&self) -> Option<Session>;
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
  fn read(&self) -> Option<Session> {
    (**self).read()
  }
}

/// Client storage persisted as a flat JSON object of string values, the
/// same shape browser local storage exports to.
pub struct FileSessionStore {
  path: PathBuf,
  user_key: String,
  token_key: String,
}

impl FileSessionStore {
  pub fn new(path: impl Into<PathBuf>, config: &SessionConfig) -> Self {
    Self {
      path: path.into(),
      user_key: config.user_key.clone(),
      token_key: config.token_key.clone(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl SessionStore for FileSessionStore {
  fn read(&self) -> Option<Session> {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(c) => c,
      Err(e) => {
        debug!(path = %self.path.display(), error = %e, "No session storage");
        return None;
      }
    };

    let storage: Map<String, Value> = match serde_json::from_str(&contents) {
      Ok(m) => m,
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "Malformed session storage");
        return None;
      }
    };

    parse_session(&storage, &self.user_key, &self.token_key)
  }
}

/// Build a session from storage entries. Both a user object and a
/// non-empty token are required.
pub(crate) fn parse_session(
  storage: &Map<String, Value>,
  user_key: &str,
  token_key: &str,
) -> Option<Session> {
  let token = match storage.get(token_key) {
    Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
    _ => return None,
  };

  let user = match storage.get(user_key)? {
    // Local storage holds strings, so the record is usually serialized JSON
    Value::String(raw) => match serde_json::from_str::<Value>(raw) {
      Ok(v) => v,
      Err(e) => {
        warn!(error = %e, "Malformed user record in session storage");
        return None;
      }
    },
    other => other.clone(),
  };

  if !user.is_object() {
    return None;
  }

  Some(Session { user, token })
}
