use crate::error::Result;
use async_trait::async_trait;
use serial_engine::{ActivateOp, ActivationOutcome, ArchiveOp, UpdateOp};
use serial_protocol::{InternalItem, OrderItemMapping, ProductionNote};

/// Persistence boundary for one workshop's orders.
///
/// Every mutating call is atomic per order. `activate_item` is a
/// find-or-create keyed by serial number (or, failing that, by suffix):
/// concurrent callers for the same unit end up with one record. The loser
/// sees `ActivationOutcome::AlreadyActive` when its fields changed the record
/// and `ActivationOutcome::AlreadyCurrent` when they did not.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load_mapping(&self, order_id: &str) -> Result<Option<OrderItemMapping>>;

    /// Writes `mapping` if the stored version still equals `expected_version`
    /// (0 when nothing is stored yet) and returns it with the new version.
    async fn save_mapping(
        &self,
        mapping: &OrderItemMapping,
        expected_version: u64,
    ) -> Result<OrderItemMapping>;

    /// Items of the order sorted by suffix, archived ones included.
    async fn list_items(&self, order_id: &str) -> Result<Vec<InternalItem>>;

    async fn activate_item(&self, op: &ActivateOp) -> Result<ActivationOutcome>;

    async fn update_item(&self, op: &UpdateOp) -> Result<InternalItem>;

    async fn archive_item(&self, op: &ArchiveOp) -> Result<InternalItem>;

    async fn list_notes(&self, order_id: &str) -> Result<Vec<ProductionNote>>;

    /// Appends unless the `(source, text)` pair is already stored.
    async fn append_note(&self, note: &ProductionNote) -> Result<bool>;
}
