use serial_engine::note_fingerprint;
use serial_protocol::{
    InternalItem, OrderItemMapping, OrderSyncStatus, ProductionNote, SyncRunReport,
};
use std::fmt::Write as _;

pub fn render_run(run: &SyncRunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Synced {} orders in {}ms: {} synced, {} partial, {} skipped, {} failed",
        run.total(),
        run.time_ms,
        run.synced,
        run.partial,
        run.skipped,
        run.failed
    );

    for order in &run.orders {
        match order.status {
            OrderSyncStatus::Synced if order.operation_count() == 0 => continue,
            OrderSyncStatus::Skipped | OrderSyncStatus::Failed => {
                let _ = writeln!(
                    out,
                    "  {} {}: {}",
                    status_label(order.status),
                    order.order_id,
                    order.error.as_deref().unwrap_or("no reason given")
                );
            }
            _ => {
                let _ = writeln!(
                    out,
                    "  {} {}: +{} ~{} ^{} -{}",
                    status_label(order.status),
                    order.order_id,
                    order.created.len(),
                    order.updated.len(),
                    order.reactivated.len(),
                    order.archived.len()
                );
                for failure in &order.failed {
                    let _ = writeln!(
                        out,
                        "    suffix {} {:?} failed: {}",
                        failure.suffix, failure.operation, failure.error
                    );
                }
            }
        }
        for skipped in &order.skipped_items {
            let _ = writeln!(
                out,
                "    skipped line item {}: {}",
                skipped.external_id, skipped.reason
            );
        }
    }
    out
}

pub fn render_order(
    order_id: &str,
    mapping: Option<&OrderItemMapping>,
    items: &[InternalItem],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Order {order_id}");

    match mapping {
        Some(mapping) => {
            let _ = writeln!(
                out,
                "Mapping v{} ({} entries, suffixes used: {})",
                mapping.version,
                mapping.item_mappings.len(),
                mapping.used_suffixes.len()
            );
            for entry in &mapping.item_mappings {
                let _ = writeln!(
                    out,
                    "  {:>4}  {}  {}",
                    entry.suffix, entry.external_id, entry.title
                );
            }
        }
        None => out.push_str("No mapping stored\n"),
    }

    let _ = writeln!(out, "Items ({})", items.len());
    for item in items {
        let state = if item.is_archived {
            format!(
                "archived: {}",
                item.archived_reason.as_deref().unwrap_or("no reason")
            )
        } else {
            item.status.clone()
        };
        let _ = writeln!(
            out,
            "  {:<12} {:<24} {}",
            item.serial_number, item.item_type, state
        );
    }
    out
}

pub fn render_notes(notes: &[ProductionNote]) -> String {
    let mut out = String::new();
    for note in notes {
        let _ = writeln!(
            out,
            "{}  {}  [{}] {}",
            note_fingerprint(&note.source, &note.text),
            note.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            note.source,
            note.text
        );
    }
    out
}

fn status_label(status: OrderSyncStatus) -> &'static str {
    match status {
        OrderSyncStatus::Synced => "synced ",
        OrderSyncStatus::Partial => "partial",
        OrderSyncStatus::Skipped => "skipped",
        OrderSyncStatus::Failed => "failed ",
    }
}
