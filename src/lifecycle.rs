//! Generation lifecycle: provisioning a new generation and cutting over.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use crate::host::HostControl;
use crate::net::Transport;
use crate::resource::{ResourceKey, ResourceRequest};
use crate::store::Store;

/// What provisioning managed to cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionReport {
  pub cached: usize,
  pub failed: usize,
}

/// Orchestrates the two one-shot lifecycle phases of a generation.
pub struct Lifecycle {
  store: Arc<dyn Store>,
  transport: Arc<dyn Transport>,
  host: Arc<dyn HostControl>,
  generation: String,
  manifest: Vec<ResourceKey>,
}

impl Lifecycle {
  pub fn new(
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostControl>,
    generation: String,
    manifest: Vec<ResourceKey>,
  ) -> Self {
    Self {
      store,
      transport,
      host,
      generation,
      manifest,
    }
  }

  /// Populate a fresh generation from the manifest.
  ///
  /// Entries are best-effort: a failed fetch or write is logged and the
  /// remaining entries still provision. Only failing to open the store
  /// aborts the phase. Ends by asking the host for an immediate takeover,
  /// without waiting for clients of the previous generation to close.
  pub async fn provision(&self) -> Result<ProvisionReport> {
    self.store.open(&self.generation)?;

    let mut report = ProvisionReport::default();
    for key in &self.manifest {
      match self.provision_entry(key).await {
        Ok(()) => report.cached += 1,
        Err(e) => {
          warn!(url = %key.url(), error = %e, "Skipping manifest entry");
          report.failed += 1;
        }
      }
    }

    info!(
      generation = %self.generation,
      cached = report.cached,
      failed = report.failed,
      "Provisioning complete"
    );

    self.host.request_takeover();

    Ok(report)
  }

  async fn provision_entry(&self, key: &ResourceKey) -> Result<()> {
    let snapshot = self.transport.fetch(ResourceRequest::for_key(key)).await?;
    if !snapshot.is_ok() {
      return Err(eyre!("Unexpected status {}", snapshot.status));
    }
    self.store.put(&self.generation, key, &snapshot)
  }

  /// Delete every stale generation, then adopt the already-open clients.
  ///
  /// Deletions are independent: one failing does not keep the others alive.
  /// Activating the current generation again is a no-op.
  pub async fn activate(&self) -> Result<()> {
    let generations = self.store.generations()?;

    let deletions = generations
      .into_iter()
      .filter(|g| g != &self.generation)
      .map(|stale| {
        let store = Arc::clone(&self.store);
        async move {
          if let Err(e) = store.delete(&stale) {
            warn!(generation = %stale, error = %e, "Failed to delete stale generation");
          }
        }
      });
    futures::future::join_all(deletions).await;

    self.host.claim_clients().await?;
    info!(generation = %self.generation, "Activated");

    Ok(())
  }
}
