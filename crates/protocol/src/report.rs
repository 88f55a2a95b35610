use crate::model::Suffix;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which visibility branch decided the active set for an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    /// No internal item existed yet; the full snapshot is captured.
    NewOrder,
    /// Two or more live items share a title; every live item is kept.
    AmbiguousDuplicates,
    /// Only items with a positive fulfillable quantity are kept.
    Fulfillment,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemOperation {
    Activate,
    Update,
    Archive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderSyncStatus {
    Synced,
    /// Mapping committed but at least one item operation failed.
    Partial,
    /// The source had no data for the order; nothing was touched.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ItemFailure {
    pub suffix: Suffix,
    pub operation: ItemOperation,
    pub error: String,
}

/// Line item left out of the sync because a reference could not be resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SkippedLineItem {
    pub external_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct OrderSyncReport {
    pub order_id: String,
    pub status: OrderSyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<VisibilityPolicy>,
    #[serde(default)]
    pub created: Vec<Suffix>,
    #[serde(default)]
    pub reactivated: Vec<Suffix>,
    #[serde(default)]
    pub updated: Vec<Suffix>,
    #[serde(default)]
    pub archived: Vec<Suffix>,
    #[serde(default)]
    pub failed: Vec<ItemFailure>,
    #[serde(default)]
    pub skipped_items: Vec<SkippedLineItem>,
    #[serde(default)]
    pub note_recorded: bool,
    #[serde(default)]
    pub mapping_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderSyncReport {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderSyncStatus::Synced,
            policy: None,
            created: Vec::new(),
            reactivated: Vec::new(),
            updated: Vec::new(),
            archived: Vec::new(),
            failed: Vec::new(),
            skipped_items: Vec::new(),
            note_recorded: false,
            mapping_attempts: 0,
            error: None,
        }
    }

    pub fn skipped(order_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: OrderSyncStatus::Skipped,
            error: Some(reason.into()),
            ..Self::new(order_id)
        }
    }

    pub fn failed(order_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: OrderSyncStatus::Failed,
            error: Some(error.into()),
            ..Self::new(order_id)
        }
    }

    pub fn record_failure(&mut self, suffix: Suffix, operation: ItemOperation, error: String) {
        self.failed.push(ItemFailure {
            suffix,
            operation,
            error,
        });
    }

    /// Settles the status once every item operation has been attempted.
    pub fn finish(&mut self) {
        if self.status == OrderSyncStatus::Synced && !self.failed.is_empty() {
            self.status = OrderSyncStatus::Partial;
        }
    }

    /// Suffixes whose operation went through, sorted.
    #[must_use]
    pub fn succeeded(&self) -> Vec<Suffix> {
        let mut out: Vec<Suffix> = self
            .created
            .iter()
            .chain(&self.reactivated)
            .chain(&self.updated)
            .chain(&self.archived)
            .copied()
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn operation_count(&self) -> usize {
        self.created.len()
            + self.reactivated.len()
            + self.updated.len()
            + self.archived.len()
            + self.failed.len()
    }
}

/// Outcome of a multi-order run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SyncRunReport {
    pub orders: Vec<OrderSyncReport>,
    pub synced: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Item operations that failed across all orders.
    pub failed_items: usize,
    pub time_ms: u64,
}

impl SyncRunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: OrderSyncReport) {
        match report.status {
            OrderSyncStatus::Synced => self.synced += 1,
            OrderSyncStatus::Partial => self.partial += 1,
            OrderSyncStatus::Skipped => self.skipped += 1,
            OrderSyncStatus::Failed => self.failed += 1,
        }
        self.failed_items += report.failed.len();
        self.orders.push(report);
    }

    pub fn total(&self) -> usize {
        self.orders.len()
    }

    pub fn is_clean(&self) -> bool {
        self.partial == 0 && self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finish_marks_partial_when_items_failed() {
        let mut report = OrderSyncReport::new("o1");
        report.created = vec![1, 3];
        report.record_failure(2, ItemOperation::Activate, "disk full".to_string());
        report.finish();
        assert_eq!(report.status, OrderSyncStatus::Partial);
        assert_eq!(report.succeeded(), vec![1, 3]);
    }

    #[test]
    fn run_report_counts_statuses() {
        let mut run = SyncRunReport::new();
        run.record(OrderSyncReport::new("a"));
        run.record(OrderSyncReport::skipped("b", "upstream down"));
        let mut partial = OrderSyncReport::new("c");
        partial.record_failure(1, ItemOperation::Archive, "boom".to_string());
        partial.finish();
        run.record(partial);

        assert_eq!(run.total(), 3);
        assert_eq!((run.synced, run.skipped, run.partial), (1, 1, 1));
        assert_eq!(run.failed_items, 1);
        assert!(!run.is_clean());
    }
}
