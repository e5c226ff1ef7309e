//! Storage port for the inventory ledger.
//!
//! `LedgerStore` is the backend-independent seam between the domain and
//! persistence. Each warehouse owns one event log guarded by an optimistic
//! version: every domain operation reads a snapshot, decides, and appends
//! with the version it read. A concurrent writer invalidates the version
//! and the append is rejected wholesale, which is how sequence counters and
//! batch remainders serialize without row locks.
//!
//! The append contract is the heart of the design: event append and
//! projection update happen in the same atomic unit, or not at all. No
//! projection may be mutated without a corresponding event existing.

use crate::errors::StoreResult;
use crate::event::{EventFilter, EventRecord, InventoryEvent};
use crate::projection::WarehouseProjection;
use crate::types::{ActorId, EventId, WarehouseId};
use crate::warehouse::Warehouse;
use async_trait::async_trait;
use nutype::nutype;

/// The version of a warehouse's event log.
///
/// Starts at 0 for an empty log and increments by one per appended event.
#[nutype(
    validate(greater_or_equal = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct LogVersion(u64);

impl LogVersion {
    /// The version of an empty log.
    pub fn initial() -> Self {
        Self::try_new(0).expect("0 is always a valid version")
    }

    /// Returns the version after one more event.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next version should always be valid")
    }
}

/// Expected log version for optimistic concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The log must be empty
    New,
    /// The log must have exactly this version
    Exact(LogVersion),
    /// Any version is acceptable (no concurrency control)
    Any,
}

/// An event to be appended to a warehouse's log.
///
/// The store assigns the authoritative `recorded_at` timestamp at commit
/// time; callers supply the identity and the fact.
#[derive(Debug, Clone)]
pub struct EventToAppend {
    /// Unique identifier (must be UUIDv7)
    pub event_id: EventId,
    /// The user or system that initiated the event
    pub actor_id: ActorId,
    /// The domain occurrence
    pub payload: InventoryEvent,
}

impl EventToAppend {
    /// Creates a new event to append with a fresh id.
    pub fn new(actor_id: ActorId, payload: InventoryEvent) -> Self {
        Self {
            event_id: EventId::new(),
            actor_id,
            payload,
        }
    }
}

/// A consistent read of one warehouse: its identity, its full derived
/// state, and the log version both were read at.
#[derive(Debug, Clone)]
pub struct WarehouseSnapshot {
    /// The warehouse
    pub warehouse: Warehouse,
    /// The derived state as of `version`
    pub projection: WarehouseProjection,
    /// Log version the snapshot was taken at
    pub version: LogVersion,
}

/// The storage port all ledger backends must satisfy.
///
/// Implementations must guarantee, for `append`:
/// - the expected-version check, timestamp stamping, event persistence and
///   projection application happen atomically; a failure anywhere leaves
///   no trace
/// - stamped `recorded_at` values are non-decreasing within a warehouse,
///   so the canonical history order is stable
/// - events are never updated or deleted afterwards; the only bypass is
///   [`LedgerStore::delete_warehouse`]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Registers a new warehouse with an empty log.
    ///
    /// # Errors
    /// `StoreError::WarehouseAlreadyRegistered` if the id is taken.
    async fn register_warehouse(&self, warehouse: Warehouse) -> StoreResult<()>;

    /// Looks up a warehouse by id.
    async fn warehouse(&self, warehouse_id: &WarehouseId) -> StoreResult<Warehouse>;

    /// Lists all registered warehouses.
    async fn warehouses(&self) -> StoreResult<Vec<Warehouse>>;

    /// Takes a consistent snapshot of one warehouse's derived state.
    async fn snapshot(&self, warehouse_id: &WarehouseId) -> StoreResult<WarehouseSnapshot>;

    /// Appends events to a warehouse's log and applies them to the live
    /// projection in the same atomic unit.
    ///
    /// Returns the new log version and the stamped records.
    ///
    /// # Errors
    /// - `StoreError::VersionConflict` if `expected` does not match
    /// - `StoreError::DuplicateEventId` if an event id already exists
    /// - `StoreError::Projection` if event application fails; the whole
    ///   append is rejected
    async fn append(
        &self,
        warehouse_id: &WarehouseId,
        expected: ExpectedVersion,
        events: Vec<EventToAppend>,
    ) -> StoreResult<(LogVersion, Vec<EventRecord>)>;

    /// Reads a warehouse's event history in canonical order.
    ///
    /// Reads are finite and restartable: the same filter against an
    /// unchanged log returns the same records.
    async fn read_events(
        &self,
        warehouse_id: &WarehouseId,
        filter: &EventFilter,
    ) -> StoreResult<Vec<EventRecord>>;

    /// Administrative cascade: removes everything the warehouse owns.
    ///
    /// Relational backends must delete in dependency order to avoid
    /// constraint violations: batch sequences, batch allocations, batch
    /// scans, batches, request projections, stock projections, events,
    /// warehouse relationship rows, then the warehouse row. Batch scans
    /// and relationship rows have no counterpart in this crate's model;
    /// backends that persist them still delete them at exactly those
    /// positions.
    async fn delete_warehouse(&self, warehouse_id: &WarehouseId) -> StoreResult<()>;
}
