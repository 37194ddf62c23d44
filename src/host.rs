//! Host-provided lifecycle facilities.

use color_eyre::Result;
use futures::future::BoxFuture;

/// Facilities the hosting runtime supplies to the lifecycle controller.
pub trait HostControl: Send + Sync {
  /// Ask the host to promote this generation immediately, without waiting
  /// for clients of the previous generation to go away. Called once at the
  /// end of provisioning.
  fn request_takeover(&self);

  /// Route every already-open client through this generation, so in-flight
  /// pages pick up the new cache without a reload. Called once at the end of
  /// activation.
  fn claim_clients(&self) -> BoxFuture<'static, Result<()>>;
}

/// Host stub for embedders without client management.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl HostControl for NoopHost {
  fn request_takeover(&self) {}

  fn claim_clients(&self) -> BoxFuture<'static, Result<()>> {
    Box::pin(async { Ok(()) })
  }
}
