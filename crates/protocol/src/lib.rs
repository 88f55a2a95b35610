//! # Serial Protocol
//!
//! Data model shared by the reconciliation engine, the stores and the sync
//! orchestrator: external line items, the per-order suffix mapping, internal
//! production items, production notes and sync reports.

use anyhow::Result;
use serde::Serialize;

mod model;
mod report;

pub use model::{
    serial_number, ExternalLineItem, InternalItem, MappingEntry, OrderItemMapping, OrderSnapshot,
    ProductionNote, SourceFetch, Suffix, ITEM_TYPE_ATTRIBUTE, MAPPING_SCHEMA_VERSION,
    STATUS_ARCHIVED,
};
pub use report::{
    ItemFailure, ItemOperation, OrderSyncReport, OrderSyncStatus, SkippedLineItem,
    SyncRunReport, VisibilityPolicy,
};

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
