#![forbid(unsafe_code)]
//! narrate-io: cache storage and the small JSON files around it.
//!
//! - [`storage`]: the [`Storage`] trait, filesystem backend, root parsing
//! - [`memory_storage`]: in-memory backend for tests
//! - [`layout`]: path scheme under the cache root
//! - [`manifest_store`]: per-environment manifest load/save
//! - [`ledger`]: provider usage records (NDJSON)
//! - [`selection`]: chosen clip variants

pub mod error;
pub mod layout;
pub mod ledger;
pub mod manifest_store;
pub mod memory_storage;
pub mod selection;
pub mod storage;

pub use error::{Error, Result};
pub use ledger::{JsonlLedger, MemoryLedger, UsageRecord, UsageSink};
pub use manifest_store::ManifestStore;
pub use memory_storage::MemoryStorage;
pub use selection::Selections;
pub use storage::{build_storage, FsStorage, Storage};
