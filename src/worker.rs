//! The worker facade: one handler per host lifecycle event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};

use crate::config::Config;
use crate::host::HostControl;
use crate::lifecycle::{Lifecycle, ProvisionReport};
use crate::net::Transport;
use crate::policy::{Intercept, InterceptPolicy};
use crate::resource::{ResourceKey, ResourceRequest};
use crate::revalidate::Revalidator;
use crate::store::Store;

/// Ties the lifecycle controller, interception policy, and revalidator to
/// the host's events.
///
/// The host wires exactly three handlers, [`on_install`], [`on_activate`],
/// and [`on_fetch`], plus the optional [`on_periodic_refresh`]. All lifecycle
/// state lives here rather than in globals, so each phase can be driven
/// deterministically in tests.
///
/// [`on_install`]: CacheWorker::on_install
/// [`on_activate`]: CacheWorker::on_activate
/// [`on_fetch`]: CacheWorker::on_fetch
/// [`on_periodic_refresh`]: CacheWorker::on_periodic_refresh
pub struct CacheWorker {
  lifecycle: Lifecycle,
  policy: InterceptPolicy,
  revalidator: Revalidator,
  manifest: Vec<ResourceKey>,
  installed: AtomicBool,
}

impl CacheWorker {
  pub fn new(
    config: Config,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    host: Arc<dyn HostControl>,
  ) -> Result<Self> {
    config.validate()?;

    let generation = config.generation();
    let shell = ResourceKey::get(&config.shell)?;
    let manifest = config
      .manifest
      .iter()
      .map(|url| ResourceKey::get(url))
      .collect::<Result<Vec<_>>>()?;

    let revalidator = Revalidator::new(
      Arc::clone(&store),
      Arc::clone(&transport),
      generation.clone(),
      config.revalidate.clone(),
    );

    let policy = InterceptPolicy::new(
      Arc::clone(&store),
      Arc::clone(&transport),
      revalidator.clone(),
      generation.clone(),
      shell,
      config.origin_policy,
    );

    let lifecycle = Lifecycle::new(store, transport, host, generation, manifest.clone());

    Ok(Self {
      lifecycle,
      policy,
      revalidator,
      manifest,
      installed: AtomicBool::new(false),
    })
  }

  /// Provisioning-start handler, run once per generation.
  ///
  /// Partial provisioning still counts as installed; only an aborted phase
  /// (store unavailable) leaves the worker uninstalled.
  pub async fn on_install(&self) -> Result<ProvisionReport> {
    let report = self.lifecycle.provision().await?;
    self.installed.store(true, Ordering::SeqCst);
    Ok(report)
  }

  /// Activation-start handler. Refuses to run until provisioning for this
  /// generation has succeeded, so cutover can never sweep the stale
  /// generations while the new one holds nothing.
  pub async fn on_activate(&self) -> Result<()> {
    if !self.installed.load(Ordering::SeqCst) {
      return Err(eyre!("Activation requested before a completed install"));
    }
    self.lifecycle.activate().await
  }

  /// Per-request interception handler.
  pub async fn on_fetch(&self, request: ResourceRequest) -> Result<Intercept> {
    self.policy.intercept(request).await
  }

  /// Optional periodic handler: refresh the revalidation-set resources
  /// independently of request traffic.
  pub async fn on_periodic_refresh(&self) {
    self.revalidator.refresh_all(&self.manifest).await;
  }
}
