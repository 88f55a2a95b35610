//! # Serial Store
//!
//! Persistence for order mappings, production items and production notes.
//!
//! Two implementations share the same per-order document logic:
//!
//! - [`MemoryStore`] keeps documents in a process-local map.
//! - [`FileStore`] keeps one JSON document per order on disk, guarded by a
//!   per-order lock file.
//!
//! Mapping writes are compare-and-swap on the mapping version, and item
//! activation is a find-or-create keyed by serial number, so racing
//! reconciliations of one order can neither hand a suffix out twice nor
//! create an item twice.

mod document;
mod error;
mod file;
mod locks;
mod memory;
mod store;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use locks::{OrderGuard, OrderLocks};
pub use memory::MemoryStore;
pub use store::OrderStore;
