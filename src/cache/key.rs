use sha2::{Digest, Sha256};

use crate::net::Request;

/// Identity of a cached request: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(request: &Request) -> Self {
    Self {
      method: request.method.clone(),
      url: request.url.to_string(),
    }
  }

  /// SHA256 of `METHOD URL`, used as a stable fixed-length primary key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}
