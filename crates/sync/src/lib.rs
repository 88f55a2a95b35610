//! # Serial Sync
//!
//! Drives the reconciliation engine for whole orders: fetch from an
//! [`ExternalOrderSource`], reconcile under a per-order lock, persist through
//! an [`serial_store::OrderStore`], report per order and per run.
//!
//! ```text
//! ExternalOrderSource ──> fetch_order ──> Unavailable ──> Skipped (nothing touched)
//!                              │
//!                              └──> Available
//!                                     │
//!                                     ├──> lookup filter
//!                                     ├──> reconcile + CAS save (retried)
//!                                     ├──> visibility + plan
//!                                     ├──> archive / activate / update (each independent)
//!                                     └──> production note
//! ```
//!
//! Orders run in parallel up to `max_concurrency`; the same order never runs
//! twice at once inside a process, and the store's compare-and-swap on the
//! mapping version covers separate processes.

mod config;
mod error;
mod orchestrator;
mod source;

pub use config::{SyncConfig, BATCH_SIZE_ENV, CONCURRENCY_ENV};
pub use error::{Result, SyncError};
pub use orchestrator::OrderSyncer;
pub use source::{ExternalOrderSource, MemorySource, SnapshotSource};
