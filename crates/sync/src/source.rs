use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serial_protocol::{OrderSnapshot, SourceFetch};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Connector to the system that owns the orders.
///
/// `fetch_order` returns `SourceFetch::Unavailable` when it has no usable data
/// (outage, rate limit, unknown order). That is never treated as an empty
/// order.
#[async_trait]
pub trait ExternalOrderSource: Send + Sync {
    async fn list_orders(&self) -> Result<Vec<String>>;

    async fn fetch_order(&self, order_id: &str) -> Result<SourceFetch>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotOrder {
    #[serde(flatten)]
    order: OrderSnapshot,
    /// Marks an order the exporter could not read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unavailable: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    orders: Vec<SnapshotOrder>,
}

/// Orders exported to a JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    order_ids: Vec<String>,
    orders: BTreeMap<String, SourceFetch>,
}

impl SnapshotSource {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Self::from_slice(&bytes).map_err(|err| {
            SyncError::SourceError(format!("snapshot {}: {err}", path.display()))
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_slice(bytes)
            .map_err(|err| SyncError::SourceError(format!("invalid snapshot: {err}")))?;

        let mut order_ids = Vec::with_capacity(file.orders.len());
        let mut orders = BTreeMap::new();
        for entry in file.orders {
            let order_id = entry.order.order_id.clone();
            let fetch = match entry.unavailable {
                Some(reason) => SourceFetch::Unavailable { reason },
                None => SourceFetch::Available(entry.order),
            };
            if orders.insert(order_id.clone(), fetch).is_some() {
                return Err(SyncError::SourceError(format!(
                    "order {order_id} appears twice in snapshot"
                )));
            }
            order_ids.push(order_id);
        }
        Ok(Self { order_ids, orders })
    }
}

#[async_trait]
impl ExternalOrderSource for SnapshotSource {
    async fn list_orders(&self) -> Result<Vec<String>> {
        Ok(self.order_ids.clone())
    }

    async fn fetch_order(&self, order_id: &str) -> Result<SourceFetch> {
        Ok(self
            .orders
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| SourceFetch::Unavailable {
                reason: format!("order {order_id} not in snapshot"),
            }))
    }
}

/// Mutable in-process source, handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    orders: RwLock<BTreeMap<String, SourceFetch>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_order(&self, snapshot: OrderSnapshot) {
        self.orders
            .write()
            .await
            .insert(snapshot.order_id.clone(), SourceFetch::Available(snapshot));
    }

    pub async fn mark_unavailable(&self, order_id: &str, reason: impl Into<String>) {
        self.orders.write().await.insert(
            order_id.to_string(),
            SourceFetch::Unavailable {
                reason: reason.into(),
            },
        );
    }
}

#[async_trait]
impl ExternalOrderSource for MemorySource {
    async fn list_orders(&self) -> Result<Vec<String>> {
        Ok(self.orders.read().await.keys().cloned().collect())
    }

    async fn fetch_order(&self, order_id: &str) -> Result<SourceFetch> {
        Ok(self
            .orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| SourceFetch::Unavailable {
                reason: format!("unknown order {order_id}"),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"{
        "orders": [
            {
                "order_id": "o1",
                "order_number": "1001",
                "note": "Engrave initials",
                "line_items": [
                    {"external_id": "li-1", "title": "Flute", "fulfillable_quantity": 1},
                    {"external_id": "li-2", "title": "Case", "parent_external_id": "li-1"}
                ]
            },
            {"order_id": "o2", "order_number": "1002", "unavailable": "rate limited"}
        ]
    }"#;

    #[tokio::test]
    async fn snapshot_distinguishes_unavailable_orders() {
        let source = SnapshotSource::from_slice(SNAPSHOT.as_bytes()).unwrap();
        assert_eq!(
            source.list_orders().await.unwrap(),
            vec!["o1".to_string(), "o2".to_string()]
        );

        match source.fetch_order("o1").await.unwrap() {
            SourceFetch::Available(order) => {
                assert_eq!(order.line_items.len(), 2);
                assert_eq!(order.note.as_deref(), Some("Engrave initials"));
            }
            other => panic!("unexpected fetch {other:?}"),
        }
        assert_eq!(
            source.fetch_order("o2").await.unwrap(),
            SourceFetch::Unavailable {
                reason: "rate limited".to_string()
            }
        );
        assert!(matches!(
            source.fetch_order("nope").await.unwrap(),
            SourceFetch::Unavailable { .. }
        ));
    }

    #[test]
    fn duplicate_orders_are_rejected() {
        let raw = r#"{"orders": [
            {"order_id": "o1", "order_number": "1"},
            {"order_id": "o1", "order_number": "1"}
        ]}"#;
        assert!(SnapshotSource::from_slice(raw.as_bytes()).is_err());
    }
}
