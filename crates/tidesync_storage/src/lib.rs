//! # Tidesync Storage
//!
//! Storage adapter trait and implementations for the tidesync local cache.
//!
//! Adapters are **opaque key-value stores**: the engine hands them a key
//! (`"dataset_" + dataset_id`) and a serialized snapshot, and never asks
//! them to understand what they hold.
//!
//! ## Design Principles
//!
//! - Adapters store bytes under string keys (load, save, remove)
//! - No knowledge of datasets, pending changes, or the sync protocol
//! - Must be `Send + Sync`; the engine shares one adapter across datasets
//! - Every call acquires and releases its own resources, including on errors
//!
//! ## Available Adapters
//!
//! - [`InMemoryStorage`] - For testing and ephemeral caches
//! - [`FileStorage`] - One file per key inside a cache directory
//!
//! ## Example
//!
//! ```rust
//! use tidesync_storage::{InMemoryStorage, StorageAdapter};
//!
//! let storage = InMemoryStorage::new();
//! storage.save("dataset_todos", b"{}").unwrap();
//! assert_eq!(storage.load("dataset_todos").unwrap().as_deref(), Some(&b"{}"[..]));
//! storage.remove("dataset_todos").unwrap();
//! assert!(storage.load("dataset_todos").unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod file;
mod memory;

pub use adapter::{dataset_key, StorageAdapter, DATASET_KEY_PREFIX};
pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
