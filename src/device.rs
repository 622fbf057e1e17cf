//! Viewport and device classification.
//!
//! A client is mobile when its user agent contains a known mobile token, or
//! when the viewport is narrower than the configured breakpoint.

use tokio::sync::watch;

use crate::config::ViewportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportClass {
  Desktop,
  Mobile,
}

/// Pure classification rules shared by every listener.
#[derive(Debug, Clone)]
pub struct DeviceDetector {
  config: ViewportConfig,
}

impl DeviceDetector {
  pub fn new(config: ViewportConfig) -> Self {
    Self { config }
  }

  pub fn is_mobile_user_agent(&self, user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    self
      .config
      .mobile_user_agents
      .iter()
      .any(|token| ua.contains(token.as_str()))
  }

  pub fn classify(&self, user_agent: &str, width: u32) -> ViewportClass {
    if width < self.config.breakpoint || self.is_mobile_user_agent(user_agent) {
      ViewportClass::Mobile
    } else {
      ViewportClass::Desktop
    }
  }

  /// Start listening to `viewport`. The returned watch is computed on mount
  /// and after every resize; dropping it releases the listener.
  pub fn mount(&self, viewport: &Viewport, user_agent: impl Into<String>) -> DeviceWatch {
    let rx = viewport.subscribe();
    let user_agent = user_agent.into();
    let class = self.classify(&user_agent, *rx.borrow());
    DeviceWatch {
      detector: self.clone(),
      user_agent,
      rx,
      class,
    }
  }
}

/// Source of resize events: the current logical width of the viewport.
pub struct Viewport {
  tx: watch::Sender<u32>,
}

impl Viewport {
  pub fn new(width: u32) -> Self {
    let (tx, _rx) = watch::channel(width);
    Self { tx }
  }

  #[cfg(test)]
  pub fn resize(&self, width: u32) {
    self.tx.send_replace(width);
  }

  /// Number of mounted listeners.
  #[cfg(test)]
  pub fn listener_count(&self) -> usize {
    self.tx.receiver_count()
  }

  fn subscribe(&self) -> watch::Receiver<u32> {
    self.tx.subscribe()
  }
}

/// A mounted resize listener holding the latest classification.
pub struct DeviceWatch {
  detector: DeviceDetector,
  user_agent: String,
  rx: watch::Receiver<u32>,
  class: ViewportClass,
}

impl DeviceWatch {
  /// Current classification, recomputed if a resize happened since the
  /// last call.
  pub fn class(&mut self) -> ViewportClass {
    if self.rx.has_changed().unwrap_or(false) {
      let width = *self.rx.borrow_and_update();
      self.class = self.detector.classify(&self.user_agent, width);
    }
    self.class
  }
}
