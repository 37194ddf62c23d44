//! Request identifiers and captured response snapshots.

use std::collections::BTreeMap;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// An outgoing resource request as seen by the interception policy.
#[derive(Clone, Debug)]
pub struct ResourceRequest {
  /// Uppercase HTTP method.
  pub method: String,
  pub url: Url,
  /// Request headers, lowercase names.
  pub headers: BTreeMap<String, String>,
}

impl ResourceRequest {
  /// Build a GET request for a URL with no headers.
  pub fn get(url: &str) -> Result<Self> {
    Ok(Self::for_key(&ResourceKey::get(url)?))
  }

  /// Build a request that re-issues the fetch a key was derived from.
  pub fn for_key(key: &ResourceKey) -> Self {
    Self {
      method: key.method().to_string(),
      url: key.url().clone(),
      headers: BTreeMap::new(),
    }
  }

  /// Build a request with an arbitrary method.
  pub fn with_method(url: &str, method: &str) -> Result<Self> {
    let url = parse_url(url)?;
    Ok(Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: BTreeMap::new(),
    })
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Only http(s) requests are interceptable; everything else passes through.
  pub fn scheme_allowed(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }

  /// Whether the declared Accept header admits an HTML response.
  pub fn accepts_html(&self) -> bool {
    self
      .headers
      .get("accept")
      .map(|v| v.contains("text/html"))
      .unwrap_or(false)
  }

  /// The normalized identifier this request is cached under.
  pub fn key(&self) -> ResourceKey {
    ResourceKey::new(&self.method, &self.url)
  }
}

/// Normalized request identifier: method plus absolute URL with the fragment
/// stripped. Only GET keys ever reach the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
  method: String,
  url: Url,
}

impl ResourceKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url,
    }
  }

  /// Key for a GET of the given URL.
  pub fn get(url: &str) -> Result<Self> {
    Ok(Self::new("GET", &parse_url(url)?))
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Stable fixed-length store key.
  pub fn store_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

fn parse_url(url: &str) -> Result<Url> {
  Url::parse(url).map_err(|e| eyre!("Invalid resource URL {}: {}", url, e))
}

/// A captured response: status, headers, and the full body.
///
/// A transport body is consumable once, so the cache only ever handles owned
/// snapshots; caching and returning a response operate on independent clones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  pub status: u16,
  /// Response headers, lowercase names.
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: Vec::new(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  pub fn is_ok(&self) -> bool {
    self.status == 200
  }
}
