use color_eyre::Result;
use std::future::Future;
use url::Url;

/// An outgoing request as seen by the controller. Bodies are not modelled:
/// only GET responses are ever cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Upper-case HTTP method
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }
}

/// How the response relates to the application origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin, readable
  Basic,
  /// Cross-origin, readable via CORS
  Cors,
  /// Cross-origin without CORS; body must be treated as unreadable
  Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: Url,
  pub status: u16,
  pub response_type: ResponseType,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only successful same-origin responses may enter a cache generation.
  pub fn is_cacheable(&self) -> bool {
    self.is_success() && self.response_type == ResponseType::Basic
  }
}

/// Transport used by the controller.
///
/// `Err` means the request never completed (offline, DNS, connection
/// refused). HTTP error statuses are returned as `Ok` responses.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}
