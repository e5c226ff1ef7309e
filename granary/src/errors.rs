//! Error types for the granary ledger.
//!
//! Errors are split by subsystem so callers can tell business failures from
//! persistence failures from event-application bugs:
//!
//! - **`LedgerError`**: domain and business-rule failures surfaced to the
//!   calling API layer
//! - **`StoreError`**: persistence-layer failures
//! - **`ProjectionError`**: event application and replay failures
//!
//! Propagation policy: every domain error surfaces as a structured failure
//! (kind + context). Contention is retried locally with backoff before
//! escalating; nothing is swallowed inside the allocator or the projector,
//! and partial application of a dispatch or inbound is never an acceptable
//! end state.

use crate::projection::RequestStatus;
use crate::store::LogVersion;
use crate::types::{BatchId, CropType, EventId, RequestId, WarehouseId};
use thiserror::Error;

/// Errors that can occur while executing a ledger operation.
///
/// # Error Handling Strategy
///
/// - **WarehouseNotFound**: fail fast, not retried
/// - **InvalidQuantity**: rejected at the boundary, never partially applied
/// - **InsufficientBatchStock / InsufficientStock**: the whole transaction
///   aborts; the caller must record more inbound stock and retry
/// - **InvalidTransition**: request state machine violation, terminal
/// - **Contention**: retried locally with backoff; surfaced only when
///   retries are exhausted
/// - **Store / Internal**: log and investigate
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The warehouse could not be resolved.
    #[error("warehouse '{0}' not found")]
    WarehouseNotFound(WarehouseId),

    /// A non-positive or otherwise unusable quantity reached the boundary.
    /// Rare in practice because `BagQuantity` validates at construction.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A single batch deduction asked for more bags than remain.
    #[error("batch {batch_id} has {remaining} bags remaining, cannot deduct {requested}")]
    InsufficientBatchStock {
        /// The batch that could not cover the deduction
        batch_id: BatchId,
        /// Bags the deduction asked for
        requested: u32,
        /// Bags actually remaining
        remaining: u32,
    },

    /// A dispatch could not be fully satisfied from live batches.
    /// No allocation is persisted; the caller resolves and retries.
    #[error("insufficient stock of {crop}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The crop that ran short
        crop: CropType,
        /// Bags the request asked for
        requested: u32,
        /// Bags available across all live batches
        available: u64,
    },

    /// An outbound request was asked to make an illegal status transition.
    #[error("request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The request being transitioned
        request_id: RequestId,
        /// Current status
        from: RequestStatus,
        /// Attempted status
        to: RequestStatus,
    },

    /// The referenced outbound request does not exist in this warehouse.
    #[error("request {0} not found")]
    RequestNotFound(RequestId),

    /// Genesis inventory was already recorded for this warehouse.
    #[error("genesis inventory already recorded for warehouse '{0}'")]
    GenesisAlreadyRecorded(WarehouseId),

    /// Concurrent writers collided on the same warehouse log. Covers both
    /// batch-sequence collisions and concurrent batch deductions, which
    /// serialize through the same per-warehouse version.
    #[error("concurrent write contention on warehouse '{warehouse}'")]
    Contention {
        /// The warehouse whose log was concurrently modified
        warehouse: WarehouseId,
    },

    /// Replay of the event log disagreed with the live projections.
    /// A data-integrity alarm, not a user error.
    #[error("projection drift detected on warehouse '{warehouse}': {detail}")]
    ProjectionDrift {
        /// The warehouse whose projections drifted
        warehouse: WarehouseId,
        /// What disagreed
        detail: String,
    },

    /// An error occurred in the ledger store.
    #[error("store error: {0}")]
    Store(StoreError),
}

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested warehouse was not found.
    #[error("warehouse '{0}' not found")]
    WarehouseNotFound(WarehouseId),

    /// A warehouse with this id is already registered.
    #[error("warehouse '{0}' already registered")]
    WarehouseAlreadyRegistered(WarehouseId),

    /// A version conflict occurred when appending events.
    #[error(
        "version conflict on warehouse '{warehouse}': expected {expected}, but current is {current}"
    )]
    VersionConflict {
        /// The warehouse log with the version conflict
        warehouse: WarehouseId,
        /// The version that was expected
        expected: LogVersion,
        /// The actual current version
        current: LogVersion,
    },

    /// An event with the given ID already exists.
    #[error("duplicate event ID: {0}")]
    DuplicateEventId(EventId),

    /// Applying an event to the live projection failed; the whole append
    /// was rejected.
    #[error("projection rejected append: {0}")]
    Projection(#[from] ProjectionError),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors raised while applying events to projections or replaying history.
#[derive(Debug, Clone, Error)]
pub enum ProjectionError {
    /// An allocation or deduction referenced a batch the projection has
    /// never seen.
    #[error("event references unknown batch {0}")]
    UnknownBatch(BatchId),

    /// A lifecycle event referenced a request the projection has never seen.
    #[error("event references unknown request {0}")]
    UnknownRequest(RequestId),

    /// A batch id was created twice.
    #[error("batch {0} already exists")]
    DuplicateBatch(BatchId),

    /// A request id was submitted twice.
    #[error("request {0} already exists")]
    DuplicateRequest(RequestId),

    /// A dispatch event's allocations do not add up to the requested
    /// quantity.
    #[error("dispatch for request {request_id} allocates {allocated} bags, requested {requested}")]
    AllocationMismatch {
        /// The dispatched request
        request_id: RequestId,
        /// Bags the event's allocation lines add up to
        allocated: u64,
        /// Bags the request asked for
        requested: u32,
    },

    /// An event would drive a batch's remaining bags negative.
    #[error("batch {batch_id} would be overdrawn: {remaining} remaining, {requested} deducted")]
    Overdraw {
        /// The batch being deducted
        batch_id: BatchId,
        /// Bags the event deducts
        requested: u32,
        /// Bags actually remaining
        remaining: u32,
    },

    /// A lifecycle event implies an illegal status transition.
    #[error("request {request_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The request being transitioned
        request_id: RequestId,
        /// Current status
        from: RequestStatus,
        /// Attempted status
        to: RequestStatus,
    },

    /// A sequence number in an event does not extend the counter densely.
    #[error("sequence for {key} is not dense: counter at {current}, event carries {carried}")]
    SequenceGap {
        /// The sequence key, rendered
        key: String,
        /// Counter value before the event
        current: u32,
        /// Value the event carries
        carried: u32,
    },

    /// The live projections disagree with a replay of the event log.
    #[error("projection drift: {0}")]
    Drift(String),
}

/// Type alias for ledger operation results.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Type alias for ledger store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for projection results.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { warehouse, .. } => Self::Contention { warehouse },
            StoreError::WarehouseNotFound(id) => Self::WarehouseNotFound(id),
            StoreError::Projection(ProjectionError::Overdraw {
                batch_id,
                requested,
                remaining,
            }) => Self::InsufficientBatchStock {
                batch_id,
                requested,
                remaining,
            },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchId;

    #[test]
    fn ledger_error_messages_are_descriptive() {
        let warehouse = WarehouseId::try_new("wh-1").unwrap();
        let err = LedgerError::WarehouseNotFound(warehouse.clone());
        assert_eq!(err.to_string(), "warehouse 'wh-1' not found");

        let err = LedgerError::InsufficientStock {
            crop: CropType::try_new("MAIZE").unwrap(),
            requested: 80,
            available: 15,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock of MAIZE: requested 80, available 15"
        );

        let err = LedgerError::Contention { warehouse };
        assert!(err.to_string().contains("contention"));
    }

    #[test]
    fn store_error_messages_are_descriptive() {
        let warehouse = WarehouseId::try_new("wh-1").unwrap();
        let err = StoreError::VersionConflict {
            warehouse,
            expected: LogVersion::try_new(5).unwrap(),
            current: LogVersion::try_new(7).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "version conflict on warehouse 'wh-1': expected 5, but current is 7"
        );
    }

    #[test]
    fn version_conflict_converts_to_contention() {
        let warehouse = WarehouseId::try_new("wh-1").unwrap();
        let store_err = StoreError::VersionConflict {
            warehouse: warehouse.clone(),
            expected: LogVersion::initial(),
            current: LogVersion::try_new(3).unwrap(),
        };
        match LedgerError::from(store_err) {
            LedgerError::Contention { warehouse: w } => assert_eq!(w, warehouse),
            other => panic!("expected Contention, got {other:?}"),
        }
    }

    #[test]
    fn warehouse_not_found_converts_directly() {
        let warehouse = WarehouseId::try_new("wh-9").unwrap();
        let store_err = StoreError::WarehouseNotFound(warehouse.clone());
        match LedgerError::from(store_err) {
            LedgerError::WarehouseNotFound(w) => assert_eq!(w, warehouse),
            other => panic!("expected WarehouseNotFound, got {other:?}"),
        }
    }

    #[test]
    fn projection_error_converts_to_store_error() {
        let err = ProjectionError::UnknownBatch(BatchId::new());
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::Projection(_)));
    }

    #[test]
    fn overdraw_surfaces_as_insufficient_batch_stock() {
        let batch_id = BatchId::new();
        let store_err = StoreError::Projection(ProjectionError::Overdraw {
            batch_id,
            requested: 12,
            remaining: 7,
        });
        match LedgerError::from(store_err) {
            LedgerError::InsufficientBatchStock {
                batch_id: b,
                requested,
                remaining,
            } => {
                assert_eq!(b, batch_id);
                assert_eq!(requested, 12);
                assert_eq!(remaining, 7);
            }
            other => panic!("expected InsufficientBatchStock, got {other:?}"),
        }
    }
}
