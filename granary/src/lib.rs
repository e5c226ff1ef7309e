//! Granary: an event-sourced warehouse inventory ledger.
//!
//! The append-only event log is the single source of truth. Every piece of
//! current state (batches and their remainders, batch-code sequence
//! counters, outbound request lifecycles, per-crop stock) is a projection
//! derived by folding events, maintained atomically alongside each append
//! and rebuildable from scratch at any time.
//!
//! # Core guarantees
//!
//! - **Replay equivalence**: rebuilding projections from the log yields
//!   exactly the live projections ([`WarehouseProjection::verify_against`]).
//! - **Conservation**: bags are neither created nor destroyed by dispatch;
//!   stock always reconciles with the sum of batch remainders.
//! - **FIFO dispatch**: allocations drain the oldest live batches first
//!   ([`allocator::plan_fifo`]).
//! - **Idempotent batch codes**: each inbound gets a dense per-(warehouse,
//!   crop, local date) sequence number, serialized through the warehouse's
//!   optimistic log version so concurrent writers never collide on a code.
//!
//! # Quick start
//!
//! ```ignore
//! use granary::{Ledger, NewWarehouse, BatchSource, GenesisIntake};
//! use granary_memory::InMemoryLedgerStore;
//!
//! let ledger = Ledger::new(InMemoryLedgerStore::new());
//! let warehouse = ledger.register_warehouse(NewWarehouse { /* .. */ }).await?;
//! let batch = ledger
//!     .record_inbound(&warehouse.id, &actor, &maize, BatchSource::Delivery, bags)
//!     .await?;
//! println!("{}", batch.code); // MAIZE-20240115-WH01-001
//! ```

pub mod allocator;
pub mod batch;
pub mod codegen;
pub mod errors;
pub mod event;
pub mod ledger;
pub mod projection;
pub mod retry;
pub mod store;
pub mod types;
pub mod warehouse;

pub use allocator::{plan_fifo, Shortfall};
pub use batch::{Batch, BatchAllocation};
pub use codegen::{format_batch_code, SequenceKey};
pub use errors::{
    LedgerError, LedgerResult, ProjectionError, ProjectionResult, StoreError, StoreResult,
};
pub use event::{
    AllocationLine, BatchSeed, BatchSource, EventFilter, EventKind, EventRecord, InventoryEvent,
};
pub use ledger::{AuditEntry, DispatchReceipt, GenesisIntake, Ledger};
pub use projection::{RequestProjection, RequestStatus, WarehouseProjection};
pub use retry::RetryConfig;
pub use store::{EventToAppend, ExpectedVersion, LedgerStore, LogVersion, WarehouseSnapshot};
pub use types::{
    ActorId, AllocationId, BagQuantity, BatchCode, BatchId, CropType, EventId, RequestId,
    SequenceNumber, Timestamp, WarehouseCode, WarehouseId, WarehouseName,
};
pub use warehouse::{NewWarehouse, Warehouse};
