use serial_protocol::{
    ExternalLineItem, InternalItem, MappingEntry, OrderItemMapping, VisibilityPolicy,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityDecision {
    pub policy: VisibilityPolicy,
    /// Mapping entries to keep active, in mapping order.
    pub visible: Vec<MappingEntry>,
}

impl VisibilityDecision {
    pub fn is_visible(&self, suffix: serial_protocol::Suffix) -> bool {
        self.visible.iter().any(|entry| entry.suffix == suffix)
    }
}

/// Decides which current mapping entries should be represented internally.
///
/// Branches are checked in order: a brand-new order keeps everything, live
/// items sharing a title keep everything, otherwise only unfulfilled items
/// stay. Entries whose external item is not live are never visible.
pub fn resolve_visible(
    mapping: &OrderItemMapping,
    live: &[ExternalLineItem],
    existing: &[InternalItem],
) -> VisibilityDecision {
    let current = mapping.current_entries(live);

    if existing.is_empty() {
        return VisibilityDecision {
            policy: VisibilityPolicy::NewOrder,
            visible: current,
        };
    }

    if has_duplicate_titles(live) {
        log::debug!(
            "Order {}: duplicate titles among live items, keeping all {} entries",
            mapping.order_id,
            current.len()
        );
        return VisibilityDecision {
            policy: VisibilityPolicy::AmbiguousDuplicates,
            visible: current,
        };
    }

    // First occurrence wins, mirroring the reconciler.
    let mut by_id: HashMap<&str, &ExternalLineItem> = HashMap::with_capacity(live.len());
    for item in live {
        by_id.entry(item.external_id.as_str()).or_insert(item);
    }
    let visible = current
        .into_iter()
        .filter(|entry| {
            by_id
                .get(entry.external_id.as_str())
                .is_some_and(|item| item.fulfillable_quantity > 0)
        })
        .collect();

    VisibilityDecision {
        policy: VisibilityPolicy::Fulfillment,
        visible,
    }
}

fn has_duplicate_titles(live: &[ExternalLineItem]) -> bool {
    let mut groups: HashMap<&str, usize> = HashMap::with_capacity(live.len());
    for item in live {
        let count = groups.entry(item.title.as_str()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::reconcile_mapping;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn item(id: &str, title: &str, qty: u32) -> ExternalLineItem {
        ExternalLineItem::new(id, title).with_fulfillable_quantity(qty)
    }

    fn internal(suffix: serial_protocol::Suffix) -> InternalItem {
        let now = Utc::now();
        InternalItem {
            id: Uuid::new_v4(),
            order_id: "o1".into(),
            suffix,
            serial_number: format!("1001-{suffix}"),
            item_type: "Flute".into(),
            status: "pending".into(),
            specifications: BTreeMap::new(),
            status_change_dates: BTreeMap::new(),
            is_archived: false,
            archived_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn visible_suffixes(decision: &VisibilityDecision) -> Vec<serial_protocol::Suffix> {
        decision.visible.iter().map(|e| e.suffix).collect()
    }

    #[test]
    fn new_order_keeps_fulfilled_items() {
        let live = vec![
            item("a", "A", 0),
            item("b", "B", 1),
            item("c", "C", 0),
            item("d", "D", 0),
            item("e", "E", 2),
        ];
        let mapping = reconcile_mapping(&OrderItemMapping::empty("o1"), &live)
            .unwrap()
            .mapping;
        let decision = resolve_visible(&mapping, &live, &[]);

        assert_eq!(decision.policy, VisibilityPolicy::NewOrder);
        assert_eq!(visible_suffixes(&decision), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duplicate_titles_keep_every_live_item() {
        let live = vec![item("a", "Flute in A", 0), item("b", "Flute in A", 1)];
        let mapping = reconcile_mapping(&OrderItemMapping::empty("o1"), &live)
            .unwrap()
            .mapping;
        let decision = resolve_visible(&mapping, &live, &[internal(1)]);

        assert_eq!(decision.policy, VisibilityPolicy::AmbiguousDuplicates);
        assert_eq!(visible_suffixes(&decision), vec![1, 2]);
    }

    #[test]
    fn default_policy_drops_fulfilled_items() {
        let live = vec![item("a", "A", 0), item("b", "B", 1), item("c", "C", 3)];
        let mapping = reconcile_mapping(&OrderItemMapping::empty("o1"), &live)
            .unwrap()
            .mapping;
        let decision = resolve_visible(&mapping, &live, &[internal(1), internal(2)]);

        assert_eq!(decision.policy, VisibilityPolicy::Fulfillment);
        assert_eq!(visible_suffixes(&decision), vec![2, 3]);
        assert!(!decision.is_visible(1));
    }

    #[test]
    fn vanished_items_are_never_visible() {
        let all = vec![item("a", "A", 1), item("b", "B", 1)];
        let mapping = reconcile_mapping(&OrderItemMapping::empty("o1"), &all)
            .unwrap()
            .mapping;
        let live = vec![item("a", "A", 1)];

        for existing in [vec![], vec![internal(1)]] {
            let decision = resolve_visible(&mapping, &live, &existing);
            assert_eq!(visible_suffixes(&decision), vec![1]);
        }
    }
}
