//! # Serial Engine
//!
//! Keeps a per-order collection of serialized production units in step with
//! the mutable line-item list of an external order, without losing recorded
//! production history.
//!
//! ## Pipeline
//!
//! ```text
//! Live line items
//!     │
//!     ├──> Lookup filter (unresolvable parents dropped)
//!     │
//!     ├──> Mapping reconciler (+ stored mapping, suffix allocator)
//!     │      └─> Updated mapping
//!     │
//!     ├──> Visibility resolver (+ existing items)
//!     │      └─> Visible entries
//!     │
//!     └──> Item materializer (+ existing items)
//!            └─> Activate / update / archive operations
//! ```
//!
//! Every function here is pure over its inputs. Reads and writes belong to the
//! caller, which applies the record transitions (`apply_activation`,
//! `apply_update`, `apply_archive`) inside its own atomic sections.
//!
//! ## Example
//!
//! ```
//! use serial_engine::{reconcile_mapping, resolve_visible, plan_materialization, MaterializeOptions};
//! use serial_protocol::{ExternalLineItem, OrderItemMapping};
//!
//! let live = vec![
//!     ExternalLineItem::new("li-1", "Flute in D"),
//!     ExternalLineItem::new("li-2", "Flute in D").with_fulfillable_quantity(0),
//! ];
//! let reconciled = reconcile_mapping(&OrderItemMapping::empty("order-7"), &live)?;
//! let decision = resolve_visible(&reconciled.mapping, &live, &[]);
//! let plan = plan_materialization(
//!     "order-7",
//!     "1007",
//!     &decision.visible,
//!     &[],
//!     &live,
//!     &MaterializeOptions::default(),
//! );
//! assert_eq!(plan.activate.len(), 2);
//! # Ok::<(), serial_engine::EngineError>(())
//! ```

mod allocator;
mod error;
mod lookup;
mod mapping;
mod materializer;
mod notes;
mod visibility;

pub use allocator::allocate_suffix;
pub use error::{EngineError, Result};
pub use lookup::{filter_resolvable, LookupOutcome};
pub use mapping::{ensure_order, reconcile_mapping, ReconciledMapping};
pub use materializer::{
    apply_activation, apply_archive, apply_update, item_fields, merge_specifications,
    plan_materialization, ActivateOp, ActivationOutcome, ArchiveOp, ItemFields,
    MaterializationPlan, MaterializeOptions, UpdateOp, DEFAULT_ARCHIVED_REASON,
    DEFAULT_INITIAL_STATUS,
};
pub use notes::{is_recorded, note_fingerprint, note_to_record, EXTERNAL_NOTE_SOURCE};
pub use visibility::{resolve_visible, VisibilityDecision};
