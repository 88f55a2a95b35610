use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::source::ExternalOrderSource;
use chrono::Utc;
use serial_engine::{
    ensure_order, filter_resolvable, note_to_record, plan_materialization, reconcile_mapping,
    resolve_visible, ActivationOutcome, MaterializationPlan,
};
use serial_protocol::{
    ExternalLineItem, ItemOperation, OrderItemMapping, OrderSnapshot, OrderSyncReport,
    SourceFetch, SyncRunReport,
};
use serial_store::{OrderLocks, OrderStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Runs the reconciliation pipeline for orders against one store.
///
/// Clones share the store and the per-order lock registry, so any number of
/// clones can sync concurrently without two of them working on the same
/// order at once.
#[derive(Clone)]
pub struct OrderSyncer {
    store: Arc<dyn OrderStore>,
    config: SyncConfig,
    locks: OrderLocks,
}

impl OrderSyncer {
    pub fn new(store: Arc<dyn OrderStore>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            locks: OrderLocks::new(),
        }
    }

    /// Shares a lock registry with other syncers of the same store.
    #[must_use]
    pub fn with_locks(mut self, locks: OrderLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Reconciles one order with the snapshot the source returned for it.
    ///
    /// Errors before any item operation (store reads, mapping commit) abort
    /// the order. Once the mapping is committed every item operation runs
    /// independently and failures end up in the report.
    pub async fn sync_order(&self, snapshot: &OrderSnapshot) -> Result<OrderSyncReport> {
        let order_id = snapshot.order_id.as_str();
        let _guard = self.locks.lock(order_id).await;
        let mut report = OrderSyncReport::new(order_id);

        let lookup = filter_resolvable(order_id, &snapshot.line_items);
        report.skipped_items.clone_from(&lookup.skipped);
        let live = &lookup.kept;

        let mapping = self.commit_mapping(order_id, live, &mut report).await?;
        let existing = self.store.list_items(order_id).await?;
        let decision = resolve_visible(&mapping, live, &existing);
        report.policy = Some(decision.policy);

        let mut plan = plan_materialization(
            order_id,
            &snapshot.order_number,
            &decision.visible,
            &existing,
            live,
            &self.config.materialize_options(),
        );
        let held = plan.hold(&lookup.held_suffixes(&mapping));
        if held > 0 {
            log::debug!("Order {order_id}: holding {held} operations on skipped line items");
        }
        log::debug!(
            "Order {order_id}: {:?} policy, {} visible, plan archive={} activate={} update={}",
            decision.policy,
            decision.visible.len(),
            plan.archive.len(),
            plan.activate.len(),
            plan.update.len()
        );
        self.apply_plan(plan, &mut report).await;
        self.record_note(snapshot, &mut report).await;

        report.finish();
        log::info!(
            "Order {order_id}: {:?} (created {}, reactivated {}, updated {}, archived {}, failed {})",
            report.status,
            report.created.len(),
            report.reactivated.len(),
            report.updated.len(),
            report.archived.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Turns a fetch result into a report, never failing.
    ///
    /// `Unavailable` leaves the order untouched; it is not an empty order.
    pub async fn sync_fetched(&self, order_id: &str, fetch: SourceFetch) -> OrderSyncReport {
        match fetch {
            SourceFetch::Unavailable { reason } => {
                log::warn!("Order {order_id}: source unavailable, skipping ({reason})");
                OrderSyncReport::skipped(order_id, reason)
            }
            SourceFetch::Available(snapshot) if snapshot.order_id != order_id => {
                let err = format!("source returned order {} instead", snapshot.order_id);
                log::warn!("Order {order_id}: {err}");
                OrderSyncReport::failed(order_id, err)
            }
            SourceFetch::Available(snapshot) => match self.sync_order(&snapshot).await {
                Ok(report) => report,
                Err(err) => {
                    log::warn!("Order {order_id}: sync failed: {err}");
                    OrderSyncReport::failed(order_id, err.to_string())
                }
            },
        }
    }

    /// Syncs every order the source lists.
    ///
    /// Orders are handled in batches of `batch_size` with at most
    /// `max_concurrency` in flight. A failing order never stops the run; only
    /// a failure to list orders does.
    pub async fn sync_all(&self, source: Arc<dyn ExternalOrderSource>) -> Result<SyncRunReport> {
        let start = Instant::now();
        let order_ids = source.list_orders().await?;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let batch_size = self.config.batch_size.max(1);
        let mut run = SyncRunReport::new();

        log::info!(
            "Syncing {} orders (batch size {batch_size}, concurrency {})",
            order_ids.len(),
            self.config.max_concurrency
        );

        for (batch_idx, batch) in order_ids.chunks(batch_size).enumerate() {
            if batch_idx > 0 && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }

            let mut tasks = Vec::with_capacity(batch.len());
            for order_id in batch {
                let syncer = self.clone();
                let source = source.clone();
                let semaphore = semaphore.clone();
                let task_order_id = order_id.clone();
                let task = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|err| SyncError::Other(format!("concurrency limiter: {err}")))?;
                    let fetch = source.fetch_order(&task_order_id).await?;
                    Ok::<_, SyncError>(syncer.sync_fetched(&task_order_id, fetch).await)
                });
                tasks.push((order_id.clone(), task));
            }

            for (order_id, task) in tasks {
                let report = match task.await {
                    Ok(Ok(report)) => report,
                    Ok(Err(err)) => {
                        log::warn!("Order {order_id}: fetch failed: {err}");
                        OrderSyncReport::failed(&order_id, err.to_string())
                    }
                    Err(err) => {
                        log::warn!("Order {order_id}: sync task aborted: {err}");
                        OrderSyncReport::failed(&order_id, format!("sync task aborted: {err}"))
                    }
                };
                run.record(report);
            }
        }

        run.time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Sync finished in {} ms: {} synced, {} partial, {} skipped, {} failed",
            run.time_ms,
            run.synced,
            run.partial,
            run.skipped,
            run.failed
        );
        Ok(run)
    }

    /// Reconciles and persists the mapping, retrying on concurrent writes.
    async fn commit_mapping(
        &self,
        order_id: &str,
        live: &[ExternalLineItem],
        report: &mut OrderSyncReport,
    ) -> Result<OrderItemMapping> {
        let max_attempts = self.config.max_mapping_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            report.mapping_attempts = attempt;
            let previous = match self.store.load_mapping(order_id).await? {
                Some(stored) => {
                    ensure_order(&stored, order_id)?;
                    stored
                }
                None => OrderItemMapping::empty(order_id),
            };

            let reconciled = reconcile_mapping(&previous, live)?;
            if !reconciled.changed_from(&previous) {
                return Ok(reconciled.mapping);
            }

            match self
                .store
                .save_mapping(&reconciled.mapping, previous.version)
                .await
            {
                Ok(saved) => {
                    if !reconciled.appended.is_empty() {
                        log::debug!(
                            "Order {order_id}: mapped {} new line items",
                            reconciled.appended.len()
                        );
                    }
                    return Ok(saved);
                }
                Err(err) if err.is_conflict() => {
                    log::debug!(
                        "Order {order_id}: mapping write lost a race (attempt {attempt}): {err}"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(SyncError::MappingConflict {
            order_id: order_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Archives first, then activations, then updates. Each operation stands
    /// alone.
    async fn apply_plan(&self, plan: MaterializationPlan, report: &mut OrderSyncReport) {
        for op in plan.archive {
            match self.store.archive_item(&op).await {
                Ok(_) => report.archived.push(op.suffix),
                Err(err) => {
                    log::warn!(
                        "Order {}: archiving {} failed: {err}",
                        op.order_id,
                        op.serial_number
                    );
                    report.record_failure(op.suffix, ItemOperation::Archive, err.to_string());
                }
            }
        }

        for op in plan.activate {
            match self.store.activate_item(&op).await {
                Ok(ActivationOutcome::Created(_)) => report.created.push(op.suffix),
                Ok(ActivationOutcome::Reactivated(_)) => report.reactivated.push(op.suffix),
                Ok(ActivationOutcome::AlreadyActive(_)) => report.updated.push(op.suffix),
                Ok(ActivationOutcome::AlreadyCurrent(_)) => {
                    log::debug!(
                        "Order {}: {} was already materialized",
                        op.order_id,
                        op.serial_number
                    );
                }
                Err(err) => {
                    log::warn!(
                        "Order {}: activating {} failed: {err}",
                        op.order_id,
                        op.serial_number
                    );
                    report.record_failure(op.suffix, ItemOperation::Activate, err.to_string());
                }
            }
        }

        for op in plan.update {
            match self.store.update_item(&op).await {
                Ok(_) => report.updated.push(op.suffix),
                Err(err) => {
                    log::warn!(
                        "Order {}: updating {} failed: {err}",
                        op.order_id,
                        op.serial_number
                    );
                    report.record_failure(op.suffix, ItemOperation::Update, err.to_string());
                }
            }
        }
    }

    async fn record_note(&self, snapshot: &OrderSnapshot, report: &mut OrderSyncReport) {
        let order_id = snapshot.order_id.as_str();
        if snapshot.note.as_deref().map_or(true, |note| note.trim().is_empty()) {
            return;
        }

        let existing = match self.store.list_notes(order_id).await {
            Ok(notes) => notes,
            Err(err) => {
                log::warn!("Order {order_id}: reading production notes failed: {err}");
                return;
            }
        };
        let Some(note) = note_to_record(
            order_id,
            &self.config.note_source,
            snapshot.note.as_deref(),
            &existing,
            Utc::now(),
        ) else {
            return;
        };

        match self.store.append_note(&note).await {
            Ok(recorded) => report.note_recorded = recorded,
            Err(err) => log::warn!("Order {order_id}: recording production note failed: {err}"),
        }
    }
}
