use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serial_protocol::{
    serial_number, ExternalLineItem, InternalItem, MappingEntry, Suffix, ITEM_TYPE_ATTRIBUTE,
    STATUS_ARCHIVED,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

pub const DEFAULT_INITIAL_STATUS: &str = "pending";
pub const DEFAULT_ARCHIVED_REASON: &str = "Removed from external order";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Workflow status given to created and reactivated items.
    pub initial_status: String,
    pub archived_reason: String,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            initial_status: DEFAULT_INITIAL_STATUS.to_string(),
            archived_reason: DEFAULT_ARCHIVED_REASON.to_string(),
        }
    }
}

/// Item attributes derived from an external line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub item_type: String,
    pub specifications: BTreeMap<String, String>,
}

/// Derives item type and specifications from a line item.
///
/// The `item_type` attribute wins over the title when it is not blank. Every
/// other attribute becomes a specification; non-string values keep their JSON
/// text and nulls are dropped.
pub fn item_fields(item: &ExternalLineItem) -> ItemFields {
    let mut item_type = None;
    let mut specifications = BTreeMap::new();

    for (key, value) in &item.raw_attributes {
        let text = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        if key == ITEM_TYPE_ATTRIBUTE {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                item_type = Some(trimmed.to_string());
            }
            continue;
        }
        specifications.insert(key.clone(), text);
    }
    specifications.insert("title".to_string(), item.title.clone());

    ItemFields {
        item_type: item_type.unwrap_or_else(|| item.title.clone()),
        specifications,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateOp {
    pub order_id: String,
    pub suffix: Suffix,
    pub serial_number: String,
    pub fields: ItemFields,
    pub initial_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub order_id: String,
    pub suffix: Suffix,
    pub serial_number: String,
    pub fields: ItemFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveOp {
    pub order_id: String,
    pub suffix: Suffix,
    pub serial_number: String,
    pub reason: String,
}

/// Disjoint operation sets for one order, each sorted by suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationPlan {
    pub archive: Vec<ArchiveOp>,
    /// Find-or-create, reactivating archived items.
    pub activate: Vec<ActivateOp>,
    pub update: Vec<UpdateOp>,
}

impl MaterializationPlan {
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty() && self.activate.is_empty() && self.update.is_empty()
    }

    pub fn len(&self) -> usize {
        self.archive.len() + self.activate.len() + self.update.len()
    }

    /// Drops every operation on the given suffixes and returns how many were
    /// dropped. Held items keep whatever state the store has for them.
    pub fn hold(&mut self, held: &BTreeSet<Suffix>) -> usize {
        if held.is_empty() {
            return 0;
        }
        let before = self.len();
        self.archive.retain(|op| !held.contains(&op.suffix));
        self.activate.retain(|op| !held.contains(&op.suffix));
        self.update.retain(|op| !held.contains(&op.suffix));
        before - self.len()
    }
}

/// Turns a visibility decision into item operations.
///
/// Items are matched to mapping entries by suffix. Updates are only planned
/// when the derived fields would change the stored item, so a repeated run
/// over unchanged input plans nothing.
pub fn plan_materialization(
    order_id: &str,
    order_number: &str,
    visible: &[MappingEntry],
    existing: &[InternalItem],
    live: &[ExternalLineItem],
    options: &MaterializeOptions,
) -> MaterializationPlan {
    let by_suffix = index_by_suffix(order_id, existing);
    let mut by_id: HashMap<&str, &ExternalLineItem> = HashMap::with_capacity(live.len());
    for item in live {
        by_id.entry(item.external_id.as_str()).or_insert(item);
    }

    let mut plan = MaterializationPlan::default();

    for (suffix, item) in &by_suffix {
        if !item.is_archived && !visible.iter().any(|entry| entry.suffix == *suffix) {
            plan.archive.push(ArchiveOp {
                order_id: order_id.to_string(),
                suffix: *suffix,
                serial_number: item.serial_number.clone(),
                reason: options.archived_reason.clone(),
            });
        }
    }

    let mut visible_sorted: Vec<&MappingEntry> = visible.iter().collect();
    visible_sorted.sort_by_key(|entry| entry.suffix);

    for entry in visible_sorted {
        let Some(line_item) = by_id.get(entry.external_id.as_str()) else {
            log::warn!(
                "Order {order_id}: visible suffix {} has no live line item {}",
                entry.suffix,
                entry.external_id
            );
            continue;
        };
        let fields = item_fields(line_item);

        match by_suffix.get(&entry.suffix) {
            Some(item) if !item.is_archived => {
                if needs_update(item, &fields) {
                    plan.update.push(UpdateOp {
                        order_id: order_id.to_string(),
                        suffix: entry.suffix,
                        serial_number: item.serial_number.clone(),
                        fields,
                    });
                }
            }
            archived => plan.activate.push(ActivateOp {
                order_id: order_id.to_string(),
                suffix: entry.suffix,
                // An archived unit keeps its serial even if the order number changed.
                serial_number: archived.map_or_else(
                    || serial_number(order_number, entry.suffix),
                    |item| item.serial_number.clone(),
                ),
                fields,
                initial_status: options.initial_status.clone(),
            }),
        }
    }

    log::debug!(
        "Order {order_id}: planned {} activate, {} update, {} archive",
        plan.activate.len(),
        plan.update.len(),
        plan.archive.len()
    );
    plan
}

fn index_by_suffix<'a>(
    order_id: &str,
    existing: &'a [InternalItem],
) -> BTreeMap<Suffix, &'a InternalItem> {
    let mut by_suffix: BTreeMap<Suffix, &InternalItem> = BTreeMap::new();
    for item in existing {
        let replace = match by_suffix.get(&item.suffix) {
            None => true,
            Some(current) => {
                log::warn!(
                    "Order {order_id}: more than one item stored for suffix {}",
                    item.suffix
                );
                current.is_archived && !item.is_archived
            }
        };
        if replace {
            by_suffix.insert(item.suffix, item);
        }
    }
    by_suffix
}

fn needs_update(item: &InternalItem, fields: &ItemFields) -> bool {
    item.item_type != fields.item_type
        || fields
            .specifications
            .iter()
            .any(|(key, value)| item.specifications.get(key) != Some(value))
}

/// Incoming keys win; keys only present on the stored item survive.
pub fn merge_specifications(
    existing: &mut BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
) {
    for (key, value) in incoming {
        existing.insert(key.clone(), value.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Created(InternalItem),
    Reactivated(InternalItem),
    /// Another writer materialized the item first; its fields were merged.
    AlreadyActive(InternalItem),
    /// Another writer materialized the item first with the same fields.
    /// Nothing was written.
    AlreadyCurrent(InternalItem),
}

impl ActivationOutcome {
    pub fn item(&self) -> &InternalItem {
        match self {
            Self::Created(item)
            | Self::Reactivated(item)
            | Self::AlreadyActive(item)
            | Self::AlreadyCurrent(item) => item,
        }
    }

    pub fn into_item(self) -> InternalItem {
        match self {
            Self::Created(item)
            | Self::Reactivated(item)
            | Self::AlreadyActive(item)
            | Self::AlreadyCurrent(item) => item,
        }
    }
}

/// Find-or-create transition for one serial number.
///
/// Stores run this inside their atomic section with whatever record they hold
/// for `op.serial_number`. `status_change_dates` is created empty and never
/// touched afterwards.
pub fn apply_activation(
    existing: Option<&InternalItem>,
    op: &ActivateOp,
    now: DateTime<Utc>,
) -> ActivationOutcome {
    match existing {
        None => ActivationOutcome::Created(InternalItem {
            id: Uuid::new_v4(),
            order_id: op.order_id.clone(),
            suffix: op.suffix,
            serial_number: op.serial_number.clone(),
            item_type: op.fields.item_type.clone(),
            status: op.initial_status.clone(),
            specifications: op.fields.specifications.clone(),
            status_change_dates: BTreeMap::new(),
            is_archived: false,
            archived_reason: None,
            created_at: now,
            updated_at: now,
        }),
        Some(item) if item.is_archived => {
            let mut item = item.clone();
            item.is_archived = false;
            item.archived_reason = None;
            item.status.clone_from(&op.initial_status);
            item.item_type.clone_from(&op.fields.item_type);
            merge_specifications(&mut item.specifications, &op.fields.specifications);
            item.updated_at = now;
            ActivationOutcome::Reactivated(item)
        }
        Some(item) if needs_update(item, &op.fields) => {
            ActivationOutcome::AlreadyActive(apply_fields(item, &op.fields, now))
        }
        Some(item) => ActivationOutcome::AlreadyCurrent(item.clone()),
    }
}

/// In-place update: item type and specifications only.
pub fn apply_update(existing: &InternalItem, op: &UpdateOp, now: DateTime<Utc>) -> InternalItem {
    apply_fields(existing, &op.fields, now)
}

pub fn apply_archive(existing: &InternalItem, op: &ArchiveOp, now: DateTime<Utc>) -> InternalItem {
    let mut item = existing.clone();
    if item.is_archived {
        return item;
    }
    item.is_archived = true;
    item.status = STATUS_ARCHIVED.to_string();
    item.archived_reason = Some(op.reason.clone());
    item.updated_at = now;
    item
}

fn apply_fields(existing: &InternalItem, fields: &ItemFields, now: DateTime<Utc>) -> InternalItem {
    let mut item = existing.clone();
    if !needs_update(&item, fields) {
        return item;
    }
    item.item_type.clone_from(&fields.item_type);
    merge_specifications(&mut item.specifications, &fields.specifications);
    item.updated_at = now;
    item
}
