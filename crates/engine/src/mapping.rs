use crate::allocator::allocate_into;
use crate::error::{EngineError, Result};
use serial_protocol::{ExternalLineItem, MappingEntry, OrderItemMapping};
use std::collections::HashSet;

/// Mapping after a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledMapping {
    /// Full mapping to persist. Entries of vanished items are kept so their
    /// suffix comes back if the item does.
    pub mapping: OrderItemMapping,
    /// Entries whose external item is live: previously mapped entries first,
    /// then the ones appended by this pass.
    pub current: Vec<MappingEntry>,
    /// Entries created by this pass, in live order.
    pub appended: Vec<MappingEntry>,
}

impl ReconciledMapping {
    pub fn changed_from(&self, previous: &OrderItemMapping) -> bool {
        self.mapping != *previous
    }
}

/// Computes the mapping for the given live line items.
///
/// Previously mapped external ids keep their suffix, unseen ones get the
/// smallest suffix never used by this order. When `live` repeats an external
/// id only its first occurrence counts.
pub fn reconcile_mapping(
    previous: &OrderItemMapping,
    live: &[ExternalLineItem],
) -> Result<ReconciledMapping> {
    previous
        .validate()
        .map_err(|reason| EngineError::InvalidMapping {
            order_id: previous.order_id.clone(),
            reason,
        })?;

    let mut mapping = previous.clone();
    let mut seen: HashSet<&str> = HashSet::with_capacity(live.len());
    let mut appended = Vec::new();

    for item in live {
        if !seen.insert(item.external_id.as_str()) {
            log::debug!(
                "Order {}: ignoring repeated external id {}",
                mapping.order_id,
                item.external_id
            );
            continue;
        }

        let known = mapping
            .item_mappings
            .iter()
            .position(|entry| entry.external_id == item.external_id);
        match known {
            Some(idx) => {
                let entry = &mut mapping.item_mappings[idx];
                if entry.title != item.title {
                    entry.title.clone_from(&item.title);
                }
            }
            None => {
                let suffix = allocate_into(&mut mapping.used_suffixes)?;
                let entry = MappingEntry {
                    external_id: item.external_id.clone(),
                    suffix,
                    title: item.title.clone(),
                };
                log::debug!(
                    "Order {}: mapped {} to suffix {suffix}",
                    mapping.order_id,
                    item.external_id
                );
                mapping.item_mappings.push(entry.clone());
                appended.push(entry);
            }
        }
    }

    let current = mapping.current_entries(live);
    Ok(ReconciledMapping {
        mapping,
        current,
        appended,
    })
}

/// Rejects a stored mapping that was filed under a different order.
pub fn ensure_order(mapping: &OrderItemMapping, order_id: &str) -> Result<()> {
    if mapping.order_id == order_id {
        Ok(())
    } else {
        Err(EngineError::OrderMismatch {
            expected: order_id.to_string(),
            actual: mapping.order_id.clone(),
        })
    }
}
