//! Offline-first resource cache with versioned store generations.
//!
//! Sits between a client application and the network: serves previously
//! fetched resources from a durable store, keeps exactly one versioned
//! generation of that store alive at a time, and falls back to a pre-cached
//! app shell when both the cache and the network come up empty. A configured
//! subset of resources (a dynamic feed) is refreshed in the background even
//! when served from cache.
//!
//! The host wires [`CacheWorker`] to its lifecycle events: install
//! (provisioning), activate (generation cutover), fetch (per-request
//! interception), and an optional periodic revalidation trigger. The feed
//! document itself is produced by [`FeedAggregator`] from configured
//! upstream sources.

pub mod config;
pub mod feed;
pub mod host;
pub mod lifecycle;
pub mod net;
pub mod policy;
pub mod resource;
pub mod revalidate;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{Config, OriginPolicy, RevalidationSet};
pub use feed::{Article, ArticleSource, FeedAggregator, FeedDocument, FeedPlan};
pub use host::{HostControl, NoopHost};
pub use lifecycle::{Lifecycle, ProvisionReport};
pub use net::{HttpTransport, Transport};
pub use policy::{Intercept, InterceptPolicy, Served};
pub use resource::{ResourceKey, ResourceRequest, ResponseSnapshot};
pub use revalidate::Revalidator;
pub use store::{MemoryStore, SqliteStore, Store, StoredResponse};
pub use worker::CacheWorker;
