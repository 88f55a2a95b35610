use serial_protocol::{ExternalLineItem, OrderItemMapping, SkippedLineItem, Suffix};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupOutcome {
    pub kept: Vec<ExternalLineItem>,
    pub skipped: Vec<SkippedLineItem>,
}

impl LookupOutcome {
    /// Suffixes of skipped items that already have a mapping entry. Their
    /// items are still part of the order and must not be archived.
    pub fn held_suffixes(&self, mapping: &OrderItemMapping) -> BTreeSet<Suffix> {
        self.skipped
            .iter()
            .filter_map(|skipped| mapping.entry_for(&skipped.external_id))
            .map(|entry| entry.suffix)
            .collect()
    }
}

/// Drops line items whose parent reference cannot be found among the live
/// items of the same order. One bad reference never affects the rest.
pub fn filter_resolvable(order_id: &str, live: &[ExternalLineItem]) -> LookupOutcome {
    let known: HashSet<&str> = live.iter().map(|item| item.external_id.as_str()).collect();
    let mut outcome = LookupOutcome::default();

    for item in live {
        match item.parent_external_id.as_deref() {
            Some(parent) if !known.contains(parent) => {
                log::warn!(
                    "Order {order_id}: skipping line item {} ({}): parent {parent} not found",
                    item.external_id,
                    item.title
                );
                outcome.skipped.push(SkippedLineItem {
                    external_id: item.external_id.clone(),
                    reason: format!("parent line item {parent} not found"),
                });
            }
            _ => outcome.kept.push(item.clone()),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_protocol::MappingEntry;

    #[test]
    fn keeps_items_with_resolvable_parents() {
        let live = vec![
            ExternalLineItem::new("kit", "Flute kit"),
            ExternalLineItem::new("case", "Case").with_parent("kit"),
            ExternalLineItem::new("strap", "Strap").with_parent("gone"),
        ];
        let out = filter_resolvable("o1", &live);

        let kept: Vec<_> = out.kept.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(kept, vec!["kit", "case"]);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].external_id, "strap");
    }

    #[test]
    fn skipped_items_hold_their_mapped_suffix() {
        let live = vec![
            ExternalLineItem::new("kit", "Flute kit"),
            ExternalLineItem::new("case", "Case").with_parent("gone"),
            ExternalLineItem::new("strap", "Strap").with_parent("gone"),
        ];
        let mut mapping = OrderItemMapping::empty("o1");
        mapping.used_suffixes = [1, 2].into_iter().collect();
        mapping.item_mappings = vec![
            MappingEntry {
                external_id: "kit".into(),
                suffix: 1,
                title: "Flute kit".into(),
            },
            MappingEntry {
                external_id: "case".into(),
                suffix: 2,
                title: "Case".into(),
            },
        ];

        let out = filter_resolvable("o1", &live);
        assert_eq!(out.held_suffixes(&mapping), BTreeSet::from([2]));
    }

    #[test]
    fn empty_input_yields_empty_outcome() {
        assert_eq!(filter_resolvable("o1", &[]), LookupOutcome::default());
    }
}
