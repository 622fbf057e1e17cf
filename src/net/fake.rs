//! In-memory network for tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use super::types::{Network, Request, Response, ResponseType};

/// Serves canned responses, records every call and can be switched offline.
pub struct FakeNetwork {
  origin: Url,
  routes: Mutex<HashMap<String, (u16, ResponseType, Vec<u8>)>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
  pub fn new(origin: &str) -> Self {
    Self {
      origin: Url::parse(origin).unwrap(),
      routes: Mutex::new(HashMap::new()),
      offline: AtomicBool::new(false),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn url(&self, path: &str) -> Url {
    self.origin.join(path).unwrap()
  }

  /// Serve a same-origin path.
  pub fn serve(&self, path: &str, status: u16, body: &str) {
    let url = self.url(path);
    self.serve_url(&url, status, ResponseType::Basic, body);
  }

  pub fn serve_url(&self, url: &Url, status: u16, response_type: ResponseType, body: &str) {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      (status, response_type, body.as_bytes().to_vec()),
    );
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of requests that reached the network for `url`.
  pub fn calls_for(&self, url: &Url) -> usize {
    let url = url.to_string();
    self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.url.to_string());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: network unreachable", request.url));
    }

    let routes = self.routes.lock().unwrap();
    let (status, response_type, body) = routes
      .get(request.url.as_str())
      .cloned()
      .unwrap_or((404, ResponseType::Basic, b"not found".to_vec()));

    Ok(Response {
      url: request.url.clone(),
      status,
      response_type,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body,
    })
  }
}
