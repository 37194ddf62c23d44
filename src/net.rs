//! Network transport abstraction and the HTTP implementation.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;

use crate::resource::{ResourceRequest, ResponseSnapshot};

/// Opaque network I/O: one request in, one captured response out.
///
/// No retries or timeouts live at this seam; a failure is whatever the
/// underlying transport surfaces.
pub trait Transport: Send + Sync {
  fn fetch(&self, request: ResourceRequest) -> BoxFuture<'static, Result<ResponseSnapshot>>;
}

/// Transport over a shared reqwest client.
#[derive(Clone, Default)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Transport for HttpTransport {
  fn fetch(&self, request: ResourceRequest) -> BoxFuture<'static, Result<ResponseSnapshot>> {
    let client = self.client.clone();

    Box::pin(async move {
      let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

      let mut builder = client.request(method, request.url.clone());
      for (name, value) in &request.headers {
        builder = builder.header(name, value);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
        .to_vec();

      Ok(ResponseSnapshot {
        status,
        headers,
        body,
      })
    })
  }
}
