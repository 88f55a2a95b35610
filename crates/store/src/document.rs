use crate::error::{Result, StoreError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serial_engine::{
    apply_activation, apply_archive, apply_update, is_recorded, ActivateOp, ActivationOutcome,
    ArchiveOp, UpdateOp,
};
use serial_protocol::{InternalItem, OrderItemMapping, ProductionNote, MAPPING_SCHEMA_VERSION};
use std::collections::BTreeMap;

/// Everything stored for one order. Items are keyed by serial number, which
/// makes the serial number unique per order by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct OrderDocument {
    pub schema_version: u32,
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<OrderItemMapping>,
    #[serde(default)]
    pub items: BTreeMap<String, InternalItem>,
    #[serde(default)]
    pub notes: Vec<ProductionNote>,
}

impl OrderDocument {
    pub fn new(order_id: &str) -> Self {
        Self {
            schema_version: MAPPING_SCHEMA_VERSION,
            order_id: order_id.to_string(),
            mapping: None,
            items: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn items(&self) -> Vec<InternalItem> {
        let mut items: Vec<InternalItem> = self.items.values().cloned().collect();
        items.sort_by_key(|item| item.suffix);
        items
    }

    /// Compare-and-swap on the mapping version.
    pub fn save_mapping(
        &mut self,
        mapping: &OrderItemMapping,
        expected_version: u64,
    ) -> Result<OrderItemMapping> {
        if mapping.order_id != self.order_id {
            return Err(StoreError::Other(format!(
                "mapping for order {} cannot be stored under order {}",
                mapping.order_id, self.order_id
            )));
        }
        let actual = self.mapping.as_ref().map_or(0, |stored| stored.version);
        if actual != expected_version {
            return Err(StoreError::Conflict {
                order_id: self.order_id.clone(),
                expected: expected_version,
                actual,
            });
        }
        mapping.validate().map_err(|reason| {
            StoreError::Other(format!(
                "refusing invalid mapping for order {}: {reason}",
                self.order_id
            ))
        })?;
        if let Some(stored) = &self.mapping {
            if !mapping.used_suffixes.is_superset(&stored.used_suffixes) {
                return Err(StoreError::Other(format!(
                    "refusing mapping for order {} that drops used suffixes",
                    self.order_id
                )));
            }
        }

        let mut next = mapping.clone();
        next.version = actual + 1;
        self.mapping = Some(next.clone());
        Ok(next)
    }

    pub fn activate(&mut self, op: &ActivateOp) -> Result<ActivationOutcome> {
        self.check_order(&op.order_id)?;
        // A suffix already stored under another serial number stays one unit.
        let key = if self.items.contains_key(&op.serial_number) {
            op.serial_number.clone()
        } else {
            self.items
                .values()
                .find(|item| item.suffix == op.suffix)
                .map_or_else(|| op.serial_number.clone(), |item| item.serial_number.clone())
        };
        let outcome = apply_activation(self.items.get(&key), op, Utc::now());
        if !matches!(outcome, ActivationOutcome::AlreadyCurrent(_)) {
            self.items.insert(key, outcome.item().clone());
        }
        Ok(outcome)
    }

    pub fn update(&mut self, op: &UpdateOp) -> Result<InternalItem> {
        self.check_order(&op.order_id)?;
        let current = self
            .items
            .get(&op.serial_number)
            .ok_or_else(|| StoreError::NotFound(format!("item {}", op.serial_number)))?;
        let next = apply_update(current, op, Utc::now());
        self.items.insert(op.serial_number.clone(), next.clone());
        Ok(next)
    }

    pub fn archive(&mut self, op: &ArchiveOp) -> Result<InternalItem> {
        self.check_order(&op.order_id)?;
        let current = self
            .items
            .get(&op.serial_number)
            .ok_or_else(|| StoreError::NotFound(format!("item {}", op.serial_number)))?;
        let next = apply_archive(current, op, Utc::now());
        self.items.insert(op.serial_number.clone(), next.clone());
        Ok(next)
    }

    /// Returns `false` when the same `(source, text)` pair is already stored.
    pub fn append_note(&mut self, note: &ProductionNote) -> Result<bool> {
        self.check_order(&note.order_id)?;
        if is_recorded(&self.notes, &note.source, &note.text) {
            return Ok(false);
        }
        self.notes.push(note.clone());
        Ok(true)
    }

    fn check_order(&self, order_id: &str) -> Result<()> {
        if order_id == self.order_id {
            Ok(())
        } else {
            Err(StoreError::Other(format!(
                "operation for order {order_id} routed to order {}",
                self.order_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_engine::{item_fields, DEFAULT_INITIAL_STATUS};
    use serial_protocol::{ExternalLineItem, MappingEntry};

    fn mapping(entries: &[(&str, u32)]) -> OrderItemMapping {
        let mut mapping = OrderItemMapping::empty("o1");
        for (id, suffix) in entries {
            mapping.used_suffixes.insert(*suffix);
            mapping.item_mappings.push(MappingEntry {
                external_id: id.to_string(),
                suffix: *suffix,
                title: id.to_string(),
            });
        }
        mapping
    }

    fn activate_op(suffix: u32) -> ActivateOp {
        ActivateOp {
            order_id: "o1".into(),
            suffix,
            serial_number: format!("1001-{suffix}"),
            fields: item_fields(&ExternalLineItem::new("x", "Flute")),
            initial_status: DEFAULT_INITIAL_STATUS.into(),
        }
    }

    #[test]
    fn save_mapping_bumps_version_and_detects_conflicts() {
        let mut doc = OrderDocument::new("o1");
        let saved = doc.save_mapping(&mapping(&[("a", 1)]), 0).unwrap();
        assert_eq!(saved.version, 1);

        let err = doc.save_mapping(&mapping(&[("a", 1), ("b", 2)]), 0).unwrap_err();
        assert!(err.is_conflict());

        let saved = doc.save_mapping(&mapping(&[("a", 1), ("b", 2)]), 1).unwrap();
        assert_eq!(saved.version, 2);
    }

    #[test]
    fn save_mapping_refuses_to_shrink_used_suffixes() {
        let mut doc = OrderDocument::new("o1");
        doc.save_mapping(&mapping(&[("a", 1), ("b", 2)]), 0).unwrap();
        let err = doc.save_mapping(&mapping(&[("a", 1)]), 1).unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));
    }

    #[test]
    fn activation_is_find_or_create() {
        let mut doc = OrderDocument::new("o1");
        let first = doc.activate(&activate_op(1)).unwrap();
        let second = doc.activate(&activate_op(1)).unwrap();

        assert!(matches!(first, ActivationOutcome::Created(_)));
        assert!(matches!(second, ActivationOutcome::AlreadyCurrent(_)));
        assert_eq!(first.item().id, second.item().id);
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn activation_finds_the_suffix_under_its_old_serial_number() {
        let mut doc = OrderDocument::new("o1");
        let first = doc.activate(&activate_op(2)).unwrap();

        let mut renumbered = activate_op(2);
        renumbered.serial_number = "1001-R-2".into();
        let second = doc.activate(&renumbered).unwrap();

        assert!(matches!(second, ActivationOutcome::AlreadyCurrent(_)));
        assert_eq!(second.item().id, first.item().id);
        assert_eq!(second.item().serial_number, "1001-2");
        assert_eq!(doc.items.len(), 1);
    }

    #[test]
    fn update_of_missing_item_is_not_found() {
        let mut doc = OrderDocument::new("o1");
        let op = UpdateOp {
            order_id: "o1".into(),
            suffix: 9,
            serial_number: "1001-9".into(),
            fields: item_fields(&ExternalLineItem::new("x", "Flute")),
        };
        assert!(matches!(doc.update(&op), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn foreign_operations_are_rejected() {
        let mut doc = OrderDocument::new("o2");
        assert!(doc.activate(&activate_op(1)).is_err());
        assert!(doc.items.is_empty());
    }
}
