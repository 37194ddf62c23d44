//! Per-request routing: cache first, then network, then the app shell.

use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, warn};

use crate::config::OriginPolicy;
use crate::net::Transport;
use crate::resource::{ResourceKey, ResourceRequest, ResponseSnapshot};
use crate::revalidate::Revalidator;
use crate::store::Store;

/// How an intercepted request was ultimately answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
  /// Straight from the current generation's store.
  Cache,
  /// Fresh from the network.
  Network,
  /// Network failed; the pre-cached app shell stood in.
  Fallback,
}

/// Outcome of running a request through the interception policy.
#[derive(Debug)]
pub enum Intercept {
  /// Not handled; the host forwards the request untouched.
  Passthrough,
  /// A response to hand back to the caller.
  Response {
    snapshot: ResponseSnapshot,
    served: Served,
  },
}

impl Intercept {
  pub fn served(&self) -> Option<Served> {
    match self {
      Intercept::Passthrough => None,
      Intercept::Response { served, .. } => Some(*served),
    }
  }
}

/// The request-routing decision engine, invoked once per outgoing request.
///
/// Cache lookup always precedes any network fetch, and a store write never
/// delays the response handed back to the caller.
pub struct InterceptPolicy {
  store: Arc<dyn Store>,
  transport: Arc<dyn Transport>,
  revalidator: Revalidator,
  generation: String,
  shell: ResourceKey,
  origin_policy: OriginPolicy,
}

impl InterceptPolicy {
  pub fn new(
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    revalidator: Revalidator,
    generation: String,
    shell: ResourceKey,
    origin_policy: OriginPolicy,
  ) -> Self {
    Self {
      store,
      transport,
      revalidator,
      generation,
      shell,
      origin_policy,
    }
  }

  /// Route one request.
  ///
  /// Terminal states: passthrough for non-GET or non-http(s) requests, cached
  /// response (with a detached refresh for revalidation-set URLs), network
  /// response (cached in the background when eligible), shell fallback for
  /// HTML navigations when the network is down, or the propagated fetch
  /// error.
  pub async fn intercept(&self, request: ResourceRequest) -> Result<Intercept> {
    if !request.is_get() || !request.scheme_allowed() {
      return Ok(Intercept::Passthrough);
    }

    let key = request.key();
    if let Some(stored) = self.store.get(&self.generation, &key)? {
      if self.revalidator.should_revalidate(key.url()) {
        self.revalidator.spawn_refresh(key.clone());
      }
      debug!(url = %key.url(), "Serving from cache");
      return Ok(Intercept::Response {
        snapshot: stored.snapshot,
        served: Served::Cache,
      });
    }

    match self.transport.fetch(request.clone()).await {
      Ok(snapshot) => {
        if self.cacheable(&key, &snapshot) {
          self.spawn_write(key, snapshot.clone());
        }
        Ok(Intercept::Response {
          snapshot,
          served: Served::Network,
        })
      }
      Err(error) => {
        // Offline fallback applies only to requests that would render HTML;
        // everything else surfaces the failure to the caller.
        if request.accepts_html() {
          if let Ok(Some(shell)) = self.store.get(&self.generation, &self.shell) {
            warn!(url = %key.url(), error = %error, "Network failed, serving app shell");
            return Ok(Intercept::Response {
              snapshot: shell.snapshot,
              served: Served::Fallback,
            });
          }
        }
        Err(error)
      }
    }
  }

  fn cacheable(&self, key: &ResourceKey, snapshot: &ResponseSnapshot) -> bool {
    snapshot.is_ok() && self.origin_policy.allows(key.url(), self.shell.url())
  }

  /// Write-after-respond: the caller never observes this write, and a write
  /// failure never affects the response already returned.
  fn spawn_write(&self, key: ResourceKey, snapshot: ResponseSnapshot) {
    let store = Arc::clone(&self.store);
    let generation = self.generation.clone();
    tokio::spawn(async move {
      if let Err(e) = store.put(&generation, &key, &snapshot) {
        warn!(url = %key.url(), error = %e, "Background cache write failed");
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::RevalidationSet;
  use crate::store::MemoryStore;
  use crate::testutil::{ok_body, FakeTransport};
  use std::time::Duration;

  const GENERATION: &str = "sustainnews-v3";
  const SHELL: &str = "https://example.org/index.html";
  const FEED: &str = "https://example.org/news.json";
  const STYLE: &str = "https://example.org/style.css";
  const CDN: &str = "https://cdn.example.net/lib.js";

  struct Fixture {
    store: Arc<MemoryStore>,
    transport: Arc<FakeTransport>,
    policy: InterceptPolicy,
  }

  fn fixture(origin_policy: OriginPolicy) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(FakeTransport::new());

    let revalidator = Revalidator::new(
      Arc::clone(&store) as Arc<dyn Store>,
      Arc::clone(&transport) as Arc<dyn Transport>,
      GENERATION.to_string(),
      RevalidationSet::new(vec!["news.json".to_string()]),
    );

    let policy = InterceptPolicy::new(
      Arc::clone(&store) as Arc<dyn Store>,
      Arc::clone(&transport) as Arc<dyn Transport>,
      revalidator,
      GENERATION.to_string(),
      ResourceKey::get(SHELL).unwrap(),
      origin_policy,
    );

    Fixture {
      store,
      transport,
      policy,
    }
  }

  /// Let detached write/refresh tasks settle.
  async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
  }

  #[tokio::test]
  async fn test_non_get_passes_through_and_is_never_stored() {
    let f = fixture(OriginPolicy::Any);
    let request = ResourceRequest::with_method(FEED, "POST").unwrap();

    let outcome = f.policy.intercept(request).await.unwrap();

    assert!(matches!(outcome, Intercept::Passthrough));
    settle().await;
    assert_eq!(f.transport.total_fetches(), 0);
    assert_eq!(f.store.entry_count(GENERATION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_disallowed_scheme_passes_through() {
    let f = fixture(OriginPolicy::Any);
    let request = ResourceRequest::get("chrome-extension://abcdef/page.html").unwrap();

    let outcome = f.policy.intercept(request).await.unwrap();
    assert!(matches!(outcome, Intercept::Passthrough));
  }

  #[tokio::test]
  async fn test_cache_hit_serves_without_network() {
    let f = fixture(OriginPolicy::Any);
    let key = ResourceKey::get(STYLE).unwrap();
    f.store.put(GENERATION, &key, &ok_body("body {}")).unwrap();

    let outcome = f
      .policy
      .intercept(ResourceRequest::get(STYLE).unwrap())
      .await
      .unwrap();

    assert_eq!(outcome.served(), Some(Served::Cache));
    settle().await;
    assert_eq!(f.transport.total_fetches(), 0);
  }

  #[tokio::test]
  async fn test_cache_hit_on_feed_triggers_exactly_one_refresh() {
    let f = fixture(OriginPolicy::Any);
    let key = ResourceKey::get(FEED).unwrap();
    f.store.put(GENERATION, &key, &ok_body("old feed")).unwrap();
    f.transport.respond(FEED, ok_body("new feed"));

    let outcome = f
      .policy
      .intercept(ResourceRequest::get(FEED).unwrap())
      .await
      .unwrap();

    // The stale copy is served immediately, not the refreshed one.
    match outcome {
      Intercept::Response { snapshot, served } => {
        assert_eq!(served, Served::Cache);
        assert_eq!(snapshot.body, b"old feed");
      }
      Intercept::Passthrough => panic!("expected a response"),
    }

    settle().await;
    assert_eq!(f.transport.fetch_count(FEED), 1);
    let stored = f.store.get(GENERATION, &key).unwrap().unwrap();
    assert_eq!(stored.snapshot.body, b"new feed");
  }

  #[tokio::test]
  async fn test_miss_fetches_and_caches_in_background() {
    let f = fixture(OriginPolicy::Any);
    f.transport.respond(STYLE, ok_body("body {}"));

    let outcome = f
      .policy
      .intercept(ResourceRequest::get(STYLE).unwrap())
      .await
      .unwrap();

    assert_eq!(outcome.served(), Some(Served::Network));
    settle().await;
    let key = ResourceKey::get(STYLE).unwrap();
    let stored = f.store.get(GENERATION, &key).unwrap().unwrap();
    assert_eq!(stored.snapshot.body, b"body {}");
  }

  #[tokio::test]
  async fn test_non_200_is_served_but_not_cached() {
    let f = fixture(OriginPolicy::Any);
    f.transport.respond(STYLE, ResponseSnapshot::new(404));

    let outcome = f
      .policy
      .intercept(ResourceRequest::get(STYLE).unwrap())
      .await
      .unwrap();

    assert_eq!(outcome.served(), Some(Served::Network));
    settle().await;
    assert_eq!(f.store.entry_count(GENERATION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_same_origin_policy_skips_cdn_responses() {
    let f = fixture(OriginPolicy::SameOrigin);
    f.transport.respond(CDN, ok_body("lib"));

    let outcome = f
      .policy
      .intercept(ResourceRequest::get(CDN).unwrap())
      .await
      .unwrap();

    assert_eq!(outcome.served(), Some(Served::Network));
    settle().await;
    assert_eq!(f.store.entry_count(GENERATION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_network_failure_falls_back_to_shell_for_html() {
    let f = fixture(OriginPolicy::Any);
    let shell_key = ResourceKey::get(SHELL).unwrap();
    f.store
      .put(GENERATION, &shell_key, &ok_body("<html>shell</html>"))
      .unwrap();
    f.transport.fail("https://example.org/article/42", "offline");

    let request = ResourceRequest::get("https://example.org/article/42")
      .unwrap()
      .with_header("accept", "text/html,application/xhtml+xml");
    let outcome = f.policy.intercept(request).await.unwrap();

    match outcome {
      Intercept::Response { snapshot, served } => {
        assert_eq!(served, Served::Fallback);
        assert_eq!(snapshot.body, b"<html>shell</html>");
      }
      Intercept::Passthrough => panic!("expected a response"),
    }
  }

  #[tokio::test]
  async fn test_network_failure_without_html_accept_propagates() {
    let f = fixture(OriginPolicy::Any);
    let shell_key = ResourceKey::get(SHELL).unwrap();
    f.store
      .put(GENERATION, &shell_key, &ok_body("<html>shell</html>"))
      .unwrap();
    f.transport.fail(FEED, "offline");

    let request = ResourceRequest::get(FEED)
      .unwrap()
      .with_header("accept", "application/json");

    assert!(f.policy.intercept(request).await.is_err());
  }

  #[tokio::test]
  async fn test_network_failure_with_missing_shell_propagates() {
    let f = fixture(OriginPolicy::Any);
    f.transport.fail("https://example.org/article/42", "offline");

    let request = ResourceRequest::get("https://example.org/article/42")
      .unwrap()
      .with_header("accept", "text/html");

    assert!(f.policy.intercept(request).await.is_err());
  }
}
