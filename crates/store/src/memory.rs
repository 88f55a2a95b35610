use crate::document::OrderDocument;
use crate::error::Result;
use crate::store::OrderStore;
use async_trait::async_trait;
use serial_engine::{ActivateOp, ActivationOutcome, ArchiveOp, UpdateOp};
use serial_protocol::{InternalItem, OrderItemMapping, ProductionNote};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Each call holds the write lock for its whole
/// read-modify-write, which makes it atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<String, OrderDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    async fn modify<T>(
        &self,
        order_id: &str,
        f: impl FnOnce(&mut OrderDocument) -> Result<T>,
    ) -> Result<T> {
        let mut orders = self.orders.write().await;
        let doc = orders
            .entry(order_id.to_string())
            .or_insert_with(|| OrderDocument::new(order_id));
        f(doc)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn load_mapping(&self, order_id: &str) -> Result<Option<OrderItemMapping>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).and_then(|doc| doc.mapping.clone()))
    }

    async fn save_mapping(
        &self,
        mapping: &OrderItemMapping,
        expected_version: u64,
    ) -> Result<OrderItemMapping> {
        self.modify(&mapping.order_id, |doc| {
            doc.save_mapping(mapping, expected_version)
        })
        .await
    }

    async fn list_items(&self, order_id: &str) -> Result<Vec<InternalItem>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).map(OrderDocument::items).unwrap_or_default())
    }

    async fn activate_item(&self, op: &ActivateOp) -> Result<ActivationOutcome> {
        self.modify(&op.order_id, |doc| doc.activate(op)).await
    }

    async fn update_item(&self, op: &UpdateOp) -> Result<InternalItem> {
        self.modify(&op.order_id, |doc| doc.update(op)).await
    }

    async fn archive_item(&self, op: &ArchiveOp) -> Result<InternalItem> {
        self.modify(&op.order_id, |doc| doc.archive(op)).await
    }

    async fn list_notes(&self, order_id: &str) -> Result<Vec<ProductionNote>> {
        let orders = self.orders.read().await;
        Ok(orders
            .get(order_id)
            .map(|doc| doc.notes.clone())
            .unwrap_or_default())
    }

    async fn append_note(&self, note: &ProductionNote) -> Result<bool> {
        self.modify(&note.order_id, |doc| doc.append_note(note)).await
    }
}
