//! # Tidesync Protocol
//!
//! Wire types and canonical hashing for the tidesync protocol.
//!
//! This crate provides:
//! - [`PendingChange`] and [`Action`] for local mutations awaiting the authority
//! - Protocol messages (`sync`, `syncRecords`, `listCollisions`, `removeCollision`)
//! - Canonical hashing of JSON values ([`canonicalize`], [`HashMethod`])
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod hash;
mod messages;

pub use change::{Action, PendingChange, Record};
pub use error::{ProtocolError, ProtocolResult};
pub use hash::{canonical_string, canonicalize, generate_hash, HashMethod, Sha256Hash};
pub use messages::{
    ListCollisionsRequest, RecordsRequest, RecordsResponse, RemoveCollisionRequest, SyncMessage,
    SyncRequest, SyncResponse, UpdateRecord, Updates, CLIENT_ID_FIELD,
};
