use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

/// Small positive integer that tells the units of one order apart.
pub type Suffix = u32;

pub const MAPPING_SCHEMA_VERSION: u32 = 1;

/// Status written onto an item when it leaves the visible set.
pub const STATUS_ARCHIVED: &str = "archived";

/// Raw attribute that overrides the title as the item type.
pub const ITEM_TYPE_ATTRIBUTE: &str = "item_type";

/// One unit of a customer order as reported by the external order source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExternalLineItem {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub fulfillable_quantity: u32,
    /// Bundle components point at the line item they belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_external_id: Option<String>,
    #[serde(default)]
    pub raw_attributes: BTreeMap<String, serde_json::Value>,
}

impl ExternalLineItem {
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            fulfillable_quantity: 1,
            parent_external_id: None,
            raw_attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_fulfillable_quantity(mut self, quantity: u32) -> Self {
        self.fulfillable_quantity = quantity;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_external_id: impl Into<String>) -> Self {
        self.parent_external_id = Some(parent_external_id.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw_attributes.insert(key.into(), value);
        self
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fulfillable_quantity == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct MappingEntry {
    pub external_id: String,
    pub suffix: Suffix,
    pub title: String,
}

/// Persisted correspondence between external line items and suffixes for one order.
///
/// `item_mappings` keeps every entry ever assigned; entries whose external item
/// disappeared stay in place so the same external id gets its old suffix back
/// when it returns. `used_suffixes` only grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct OrderItemMapping {
    pub order_id: String,
    /// Bumped by the store on every successful write.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub used_suffixes: BTreeSet<Suffix>,
    #[serde(default)]
    pub item_mappings: Vec<MappingEntry>,
}

impl OrderItemMapping {
    pub fn empty(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            version: 0,
            used_suffixes: BTreeSet::new(),
            item_mappings: Vec::new(),
        }
    }

    #[must_use]
    pub fn entry_for(&self, external_id: &str) -> Option<&MappingEntry> {
        self.item_mappings
            .iter()
            .find(|entry| entry.external_id == external_id)
    }

    /// Entries whose external item is part of `live`, in mapping order.
    #[must_use]
    pub fn current_entries(&self, live: &[ExternalLineItem]) -> Vec<MappingEntry> {
        let live_ids: HashSet<&str> = live.iter().map(|item| item.external_id.as_str()).collect();
        self.item_mappings
            .iter()
            .filter(|entry| live_ids.contains(entry.external_id.as_str()))
            .cloned()
            .collect()
    }

    /// Checks the uniqueness and membership rules of the mapping.
    pub fn validate(&self) -> Result<(), String> {
        let mut ids = HashSet::new();
        let mut suffixes = HashSet::new();
        for entry in &self.item_mappings {
            if entry.suffix == 0 {
                return Err(format!("external id {} mapped to suffix 0", entry.external_id));
            }
            if !ids.insert(entry.external_id.as_str()) {
                return Err(format!("external id {} mapped twice", entry.external_id));
            }
            if !suffixes.insert(entry.suffix) {
                return Err(format!("suffix {} assigned twice", entry.suffix));
            }
            if !self.used_suffixes.contains(&entry.suffix) {
                return Err(format!(
                    "suffix {} of {} missing from used_suffixes",
                    entry.suffix, entry.external_id
                ));
            }
        }
        Ok(())
    }
}

/// Locally tracked production unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct InternalItem {
    #[schemars(with = "String")]
    pub id: Uuid,
    pub order_id: String,
    pub suffix: Suffix,
    pub serial_number: String,
    pub item_type: String,
    pub status: String,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    /// Owned by the production workflow. Reconciliation never rewrites it.
    #[serde(default)]
    #[schemars(with = "BTreeMap<String, String>")]
    pub status_change_dates: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_reason: Option<String>,
    #[schemars(with = "String")]
    pub created_at: DateTime<Utc>,
    #[schemars(with = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Append-only free-text note attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct ProductionNote {
    #[schemars(with = "String")]
    pub id: Uuid,
    pub order_id: String,
    pub source: String,
    pub text: String,
    #[schemars(with = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// Everything the external source reports for one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct OrderSnapshot {
    pub order_id: String,
    pub order_number: String,
    #[serde(default)]
    pub line_items: Vec<ExternalLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Result of asking the external source for an order.
///
/// `Unavailable` is distinct from an order with no line items: it must never
/// lead to archiving.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFetch {
    Available(OrderSnapshot),
    Unavailable { reason: String },
}

#[must_use]
pub fn serial_number(order_number: &str, suffix: Suffix) -> String {
    format!("{order_number}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(id: &str, suffix: Suffix) -> MappingEntry {
        MappingEntry {
            external_id: id.to_string(),
            suffix,
            title: format!("Item {id}"),
        }
    }

    #[test]
    fn serial_number_joins_order_and_suffix() {
        assert_eq!(serial_number("1042", 3), "1042-3");
    }

    #[test]
    fn current_entries_keeps_mapping_order() {
        let mut mapping = OrderItemMapping::empty("o1");
        mapping.used_suffixes = [1, 2, 3].into_iter().collect();
        mapping.item_mappings = vec![entry("a", 1), entry("b", 2), entry("c", 3)];

        let live = vec![ExternalLineItem::new("c", "C"), ExternalLineItem::new("a", "A")];
        let ids: Vec<_> = mapping
            .current_entries(&live)
            .into_iter()
            .map(|e| e.external_id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn validate_rejects_unrecorded_suffix() {
        let mut mapping = OrderItemMapping::empty("o1");
        mapping.used_suffixes = [1].into_iter().collect();
        mapping.item_mappings = vec![entry("a", 1), entry("b", 2)];
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_external_id() {
        let mut mapping = OrderItemMapping::empty("o1");
        mapping.used_suffixes = [1, 2].into_iter().collect();
        mapping.item_mappings = vec![entry("a", 1), entry("a", 2)];
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn line_item_defaults_when_fields_missing() {
        let item: ExternalLineItem =
            serde_json::from_str(r#"{"external_id":"x","title":"Flute"}"#).unwrap();
        assert_eq!(item.fulfillable_quantity, 0);
        assert!(item.parent_external_id.is_none());
        assert!(item.raw_attributes.is_empty());
    }
}
