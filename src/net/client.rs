use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use reqwest::Method;
use url::Url;

use super::types::{Network, Request, Response, ResponseType};

/// HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("fmpwa/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  fn response_type(&self, url: &Url, cors: bool) -> ResponseType {
    if url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else if cors {
      ResponseType::Cors
    } else {
      ResponseType::Opaque
    }
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let url = response.url().clone();
    let status = response.status().as_u16();
    let cors = response.headers().contains_key(ACCESS_CONTROL_ALLOW_ORIGIN);
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
      .to_vec();

    Ok(Response {
      response_type: self.response_type(&url, cors),
      url,
      status,
      headers,
      body,
    })
  }
}
