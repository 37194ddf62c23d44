//! Shared test doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;

use crate::host::HostControl;
use crate::net::Transport;
use crate::resource::{ResourceKey, ResourceRequest, ResponseSnapshot};
use crate::store::{Store, StoredResponse};

/// Scripted transport: URL → canned response or failure, with fetch counts.
#[derive(Default)]
pub struct FakeTransport {
  responses: Mutex<HashMap<String, Result<ResponseSnapshot, String>>>,
  fetched: Mutex<Vec<String>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, snapshot: ResponseSnapshot) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url.to_string(), Ok(snapshot));
  }

  pub fn fail(&self, url: &str, message: &str) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url.to_string(), Err(message.to_string()));
  }

  pub fn fetch_count(&self, url: &str) -> usize {
    self
      .fetched
      .lock()
      .unwrap()
      .iter()
      .filter(|u| u.as_str() == url)
      .count()
  }

  pub fn total_fetches(&self) -> usize {
    self.fetched.lock().unwrap().len()
  }
}

impl Transport for FakeTransport {
  fn fetch(&self, request: ResourceRequest) -> BoxFuture<'static, Result<ResponseSnapshot>> {
    self.fetched.lock().unwrap().push(request.url.to_string());

    let scripted = self
      .responses
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned();

    Box::pin(async move {
      match scripted {
        Some(Ok(snapshot)) => Ok(snapshot),
        Some(Err(message)) => Err(eyre!("{}", message)),
        None => Err(eyre!("No scripted response for {}", request.url)),
      }
    })
  }
}

/// Host double counting takeover and claim calls.
#[derive(Default)]
pub struct RecordingHost {
  pub takeovers: AtomicUsize,
  pub claims: AtomicUsize,
}

impl RecordingHost {
  pub fn new() -> Self {
    Self::default()
  }
}

impl HostControl for RecordingHost {
  fn request_takeover(&self) {
    self.takeovers.fetch_add(1, Ordering::SeqCst);
  }

  fn claim_clients(&self) -> BoxFuture<'static, Result<()>> {
    self.claims.fetch_add(1, Ordering::SeqCst);
    Box::pin(async { Ok(()) })
  }
}

/// Store whose open step always fails, for exercising the fatal
/// store-unavailable path.
pub struct BrokenStore;

impl Store for BrokenStore {
  fn open(&self, _generation: &str) -> Result<()> {
    Err(eyre!("storage exhausted"))
  }

  fn get(&self, _generation: &str, _key: &ResourceKey) -> Result<Option<StoredResponse>> {
    Ok(None)
  }

  fn put(
    &self,
    _generation: &str,
    _key: &ResourceKey,
    _snapshot: &ResponseSnapshot,
  ) -> Result<()> {
    Err(eyre!("storage exhausted"))
  }

  fn generations(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete(&self, _generation: &str) -> Result<()> {
    Ok(())
  }
}

pub fn ok_body(body: &str) -> ResponseSnapshot {
  ResponseSnapshot::new(200).with_body(body)
}
