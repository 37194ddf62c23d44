//! Background refresh for resources whose cached copy is never final.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::config::RevalidationSet;
use crate::net::Transport;
use crate::resource::{ResourceKey, ResourceRequest};
use crate::store::Store;

/// Refreshes designated entries from the network, outside any request's
/// awaited path.
///
/// Two entry points exist: [`spawn_refresh`] runs opportunistically when the
/// policy serves a matching entry from cache, and [`refresh_all`] is the
/// scheduled path driven by the host's periodic trigger.
///
/// [`spawn_refresh`]: Revalidator::spawn_refresh
/// [`refresh_all`]: Revalidator::refresh_all
#[derive(Clone)]
pub struct Revalidator {
  store: Arc<dyn Store>,
  transport: Arc<dyn Transport>,
  generation: String,
  set: RevalidationSet,
}

impl Revalidator {
  pub fn new(
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    generation: String,
    set: RevalidationSet,
  ) -> Self {
    Self {
      store,
      transport,
      generation,
      set,
    }
  }

  /// Whether a URL belongs to the revalidation set.
  pub fn should_revalidate(&self, url: &Url) -> bool {
    self.set.matches(url)
  }

  /// Fetch a resource and overwrite its entry on success.
  ///
  /// Failures are silent: a failed refresh leaves the previously cached copy
  /// authoritative until the next trigger. There is no retry.
  pub async fn refresh(&self, key: &ResourceKey) {
    match self.transport.fetch(ResourceRequest::for_key(key)).await {
      Ok(snapshot) if snapshot.is_ok() => {
        if let Err(e) = self.store.put(&self.generation, key, &snapshot) {
          debug!(url = %key.url(), error = %e, "Revalidation write failed");
        } else {
          debug!(url = %key.url(), "Revalidated cache entry");
        }
      }
      Ok(snapshot) => {
        debug!(url = %key.url(), status = snapshot.status, "Ignoring non-200 revalidation response");
      }
      Err(e) => {
        debug!(url = %key.url(), error = %e, "Revalidation fetch failed, keeping cached copy");
      }
    }
  }

  /// Detached refresh used on cache hits. The caller never observes the
  /// result; the serving path must not wait on it.
  pub fn spawn_refresh(&self, key: ResourceKey) {
    let revalidator = self.clone();
    tokio::spawn(async move {
      revalidator.refresh(&key).await;
    });
  }

  /// Scheduled entry point: refresh every candidate in the revalidation set.
  /// Invoked by an external periodic scheduler, never by request traffic.
  pub async fn refresh_all(&self, candidates: &[ResourceKey]) {
    for key in candidates {
      if self.set.matches(key.url()) {
        self.refresh(key).await;
      }
    }
  }
}
