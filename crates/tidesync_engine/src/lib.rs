//! # Tidesync Engine
//!
//! Offline-first synchronization of named datasets with a remote authority.
//!
//! This crate provides:
//! - A local cache per dataset, updated optimistically on every change
//! - A pending change store with merge, cancel and delay rules
//! - Crash and delay recovery for changes whose outcome is unknown
//! - Temporary to permanent uid remapping for records created offline
//! - A periodic scheduler driving one sync loop per dataset
//! - HTTP cloud handler abstraction
//!
//! ## Architecture
//!
//! Each sync loop runs a **two-phase** reconciliation:
//! 1. Submit pending changes together with the last known dataset hash
//! 2. If the authority's hash differs, diff record hashes and apply the delta
//!
//! Local writes never wait for the network. The authority decides how
//! collisions are resolved; the client surfaces them as notifications.
//!
//! ## Key Invariants
//!
//! - At most one sync loop runs per dataset at any time
//! - Pending changes are identified by the hash of their content
//! - Answers are matched to changes by hash, so replaying one is harmless
//! - A record with an unconfirmed local change is never overwritten by a delta
//! - Notifications are delivered on scheduler ticks, never from inside a call

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod clock;
mod config;
mod dataset;
mod error;
mod http;
mod network;
mod notify;
mod pending;
mod record_sync;
mod registry;
#[cfg(feature = "reqwest")]
mod reqwest_client;
mod scheduler;
mod state;
mod sync_loop;
mod transport;
mod uid_map;

pub use client::{SyncClient, SyncClientBuilder, CLIENT_ID_KEY};
pub use config::{Config, DEFAULT_CLOUD_PATH};
pub use dataset::{Dataset, RecordMeta};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpCloudHandler};
pub use network::{AlwaysOnline, NetworkStatus, NetworkSwitch};
pub use notify::{Notification, NotificationCode, Notifier, NotifyCallback};
pub use pending::ProcessedUpdate;
pub use registry::DatasetRegistry;
#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestClient;
pub use scheduler::TICK_INTERVAL;
pub use transport::{CloudHandler, CloudRequest, MockCloudHandler};
pub use uid_map::UidMap;

pub use tidesync_protocol::{
    canonicalize, generate_hash, Action, HashMethod, PendingChange, Record, Sha256Hash,
};
