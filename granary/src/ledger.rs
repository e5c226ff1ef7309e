//! The ledger service: every domain operation as one atomic commit.
//!
//! Each operation follows the same discipline: take a versioned snapshot
//! of the warehouse, decide against it (business rules, FIFO planning,
//! sequence numbering), and append the resulting events with the version
//! the snapshot was taken at. A concurrent writer invalidates the version
//! and the operation retries with fresh state, up to a bounded number of
//! attempts with jittered backoff. Either the events commit together with
//! their projection updates, or nothing is persisted at all.

use crate::allocator::plan_fifo;
use crate::batch::{Batch, BatchAllocation};
use crate::codegen::{format_batch_code, SequenceKey};
use crate::errors::{LedgerError, LedgerResult, StoreError};
use crate::event::{
    BatchSeed, BatchSource, EventFilter, EventKind, EventRecord, InventoryEvent,
};
use crate::projection::{RequestProjection, RequestStatus};
use crate::retry::RetryConfig;
use crate::store::{EventToAppend, ExpectedVersion, LedgerStore, WarehouseSnapshot};
use crate::types::{
    ActorId, BagQuantity, CropType, EventId, RequestId, SequenceNumber, Timestamp, WarehouseId,
    WarehouseName,
};
use crate::warehouse::{NewWarehouse, Warehouse};
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn};

/// One crop lot in a genesis inventory count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisIntake {
    /// Crop type of the lot
    pub crop: CropType,
    /// Bags counted
    pub bags: BagQuantity,
}

/// Result of a successful dispatch execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// The executed request
    pub request_id: RequestId,
    /// Per-batch allocation rows, FIFO order
    pub allocations: Vec<BatchAllocation>,
    /// When the dispatch was executed
    pub executed_at: Timestamp,
}

/// One row of the read-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Identifier of the underlying event record
    pub event_id: EventId,
    /// Wire-named event type
    pub kind: EventKind,
    /// Name of the warehouse the event belongs to
    pub warehouse_name: WarehouseName,
    /// Who initiated the event
    pub actor_id: ActorId,
    /// When the event was recorded
    pub recorded_at: Timestamp,
    /// The full domain occurrence
    pub payload: InventoryEvent,
}

/// The inventory ledger service.
///
/// Generic over the storage backend; all domain logic lives here and in
/// the pure modules it calls into ([`crate::allocator`],
/// [`crate::projection`], [`crate::codegen`]).
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    retry: RetryConfig,
}

impl<S> Ledger<S>
where
    S: LedgerStore,
{
    /// Creates a ledger over the given store with default retry behavior.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    /// Overrides the retry configuration.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Registers a new warehouse with an empty event log.
    #[instrument(skip(self, new), fields(warehouse_id = %new.id))]
    pub async fn register_warehouse(&self, new: NewWarehouse) -> LedgerResult<Warehouse> {
        let warehouse = new.into_warehouse(Timestamp::now());
        self.store.register_warehouse(warehouse.clone()).await?;
        info!(code = %warehouse.code, "warehouse registered");
        Ok(warehouse)
    }

    /// Records the initial inventory of a warehouse, one batch per entry.
    ///
    /// Allowed exactly once per warehouse; fails with
    /// `GenesisAlreadyRecorded` afterwards.
    #[instrument(skip(self, actor_id, intakes), fields(entries = intakes.len()))]
    pub async fn record_genesis(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        intakes: &[GenesisIntake],
    ) -> LedgerResult<Vec<Batch>> {
        if intakes.is_empty() {
            return Err(LedgerError::InvalidQuantity(
                "genesis requires at least one entry".to_string(),
            ));
        }

        let (_, records) = self
            .commit_with_retry(warehouse_id, |snapshot| {
                if snapshot.projection.genesis_recorded {
                    return Err(LedgerError::GenesisAlreadyRecorded(warehouse_id.clone()));
                }
                let mut staged = BTreeMap::new();
                let batches = intakes
                    .iter()
                    .map(|intake| {
                        seed_batch(
                            snapshot,
                            &mut staged,
                            &intake.crop,
                            BatchSource::Genesis,
                            intake.bags,
                        )
                    })
                    .collect();
                Ok(vec![EventToAppend::new(
                    actor_id.clone(),
                    InventoryEvent::GenesisInventoryRecorded { batches },
                )])
            })
            .await?;

        let record = records
            .first()
            .ok_or_else(|| internal("commit returned no records"))?;
        let InventoryEvent::GenesisInventoryRecorded { batches } = &record.payload else {
            return Err(internal("genesis commit returned a foreign event"));
        };
        let created = batches
            .iter()
            .map(|seed| Batch::from_seed(seed, warehouse_id.clone(), record.recorded_at))
            .collect::<Vec<_>>();
        info!(batches = created.len(), "genesis inventory recorded");
        Ok(created)
    }

    /// Records inbound stock as a new dated batch and returns it, code
    /// included.
    #[instrument(skip(self, actor_id), fields(%crop, bags = %bags))]
    pub async fn record_inbound(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        crop: &CropType,
        source: BatchSource,
        bags: BagQuantity,
    ) -> LedgerResult<Batch> {
        let (_, records) = self
            .commit_with_retry(warehouse_id, |snapshot| {
                let mut staged = BTreeMap::new();
                let batch = seed_batch(snapshot, &mut staged, crop, source, bags);
                Ok(vec![EventToAppend::new(
                    actor_id.clone(),
                    InventoryEvent::StockInboundRecorded { batch },
                )])
            })
            .await?;

        let record = records
            .first()
            .ok_or_else(|| internal("commit returned no records"))?;
        let InventoryEvent::StockInboundRecorded { batch } = &record.payload else {
            return Err(internal("inbound commit returned a foreign event"));
        };
        let created = Batch::from_seed(batch, warehouse_id.clone(), record.recorded_at);
        info!(code = %created.code, "stock inbound recorded");
        Ok(created)
    }

    /// Submits a new outbound dispatch request in `PENDING` status.
    #[instrument(skip(self, actor_id), fields(%crop, bags = %bags))]
    pub async fn submit_request(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        crop: &CropType,
        bags: BagQuantity,
    ) -> LedgerResult<RequestProjection> {
        let (_, records) = self
            .commit_with_retry(warehouse_id, |_| {
                Ok(vec![EventToAppend::new(
                    actor_id.clone(),
                    InventoryEvent::OutboundRequested {
                        request_id: RequestId::new(),
                        crop: crop.clone(),
                        bags,
                    },
                )])
            })
            .await?;

        let record = records
            .first()
            .ok_or_else(|| internal("commit returned no records"))?;
        let InventoryEvent::OutboundRequested { request_id, .. } = &record.payload else {
            return Err(internal("request commit returned a foreign event"));
        };
        info!(request_id = %request_id, "outbound requested");
        Ok(RequestProjection {
            request_id: *request_id,
            warehouse_id: warehouse_id.clone(),
            crop: crop.clone(),
            bags,
            status: RequestStatus::Pending,
            requested_at: record.recorded_at,
            decided_at: None,
            rejection_reason: None,
            executed_at: None,
        })
    }

    /// Approves a pending request.
    #[instrument(skip(self, actor_id), fields(%request_id))]
    pub async fn approve_request(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        request_id: RequestId,
    ) -> LedgerResult<RequestProjection> {
        self.decide_request(
            warehouse_id,
            actor_id,
            request_id,
            RequestStatus::Approved,
            None,
        )
        .await
    }

    /// Rejects a pending request. Rejection is terminal.
    #[instrument(skip(self, actor_id, reason), fields(%request_id))]
    pub async fn reject_request(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        request_id: RequestId,
        reason: Option<String>,
    ) -> LedgerResult<RequestProjection> {
        self.decide_request(
            warehouse_id,
            actor_id,
            request_id,
            RequestStatus::Rejected,
            reason,
        )
        .await
    }

    /// Executes an approved request in one atomic commit: allocates batches
    /// FIFO, records the allocations, and transitions the request to
    /// `EXECUTED`. A shortfall aborts the whole dispatch; no partial
    /// allocation is ever persisted.
    #[instrument(skip(self, actor_id), fields(%request_id))]
    pub async fn execute_dispatch(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        request_id: RequestId,
    ) -> LedgerResult<DispatchReceipt> {
        let (_, records) = self
            .commit_with_retry(warehouse_id, |snapshot| {
                let request = snapshot
                    .projection
                    .request(request_id)
                    .ok_or(LedgerError::RequestNotFound(request_id))?;
                if request.status != RequestStatus::Approved {
                    return Err(LedgerError::InvalidTransition {
                        request_id,
                        from: request.status,
                        to: RequestStatus::Executed,
                    });
                }

                let live = snapshot.projection.live_batches(&request.crop);
                let allocations =
                    plan_fifo(&live, request.bags).map_err(|shortfall| {
                        LedgerError::InsufficientStock {
                            crop: request.crop.clone(),
                            requested: shortfall.requested,
                            available: shortfall.available,
                        }
                    })?;

                Ok(vec![EventToAppend::new(
                    actor_id.clone(),
                    InventoryEvent::DispatchExecuted {
                        request_id,
                        allocations,
                    },
                )])
            })
            .await?;

        let record = records
            .first()
            .ok_or_else(|| internal("commit returned no records"))?;
        let InventoryEvent::DispatchExecuted { allocations, .. } = &record.payload else {
            return Err(internal("dispatch commit returned a foreign event"));
        };
        let receipt = DispatchReceipt {
            request_id,
            allocations: allocations
                .iter()
                .map(|line| BatchAllocation::from_line(request_id, line))
                .collect(),
            executed_at: record.recorded_at,
        };
        info!(
            batches = receipt.allocations.len(),
            "dispatch executed"
        );
        Ok(receipt)
    }

    /// Read-only audit trail of a warehouse's history.
    pub async fn audit_trail(
        &self,
        warehouse_id: &WarehouseId,
        filter: &EventFilter,
    ) -> LedgerResult<Vec<AuditEntry>> {
        let warehouse = self.store.warehouse(warehouse_id).await?;
        let records = self.store.read_events(warehouse_id, filter).await?;
        Ok(records
            .into_iter()
            .map(|record| AuditEntry {
                event_id: record.event_id,
                kind: record.payload.kind(),
                warehouse_name: warehouse.name.clone(),
                actor_id: record.actor_id,
                recorded_at: record.recorded_at,
                payload: record.payload,
            })
            .collect())
    }

    /// Current stock per crop at a warehouse.
    pub async fn stock_levels(
        &self,
        warehouse_id: &WarehouseId,
    ) -> LedgerResult<BTreeMap<CropType, u64>> {
        let snapshot = self.store.snapshot(warehouse_id).await?;
        Ok(snapshot.projection.stock)
    }

    /// Live batches of a crop in FIFO order.
    pub async fn live_batches(
        &self,
        warehouse_id: &WarehouseId,
        crop: &CropType,
    ) -> LedgerResult<Vec<Batch>> {
        let snapshot = self.store.snapshot(warehouse_id).await?;
        Ok(snapshot
            .projection
            .live_batches(crop)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Looks up one request's current projection.
    pub async fn request(
        &self,
        warehouse_id: &WarehouseId,
        request_id: RequestId,
    ) -> LedgerResult<RequestProjection> {
        let snapshot = self.store.snapshot(warehouse_id).await?;
        snapshot
            .projection
            .request(request_id)
            .cloned()
            .ok_or(LedgerError::RequestNotFound(request_id))
    }

    /// Replays the warehouse's full history and checks it against the live
    /// projections, including the stock/batch reconciliation.
    ///
    /// Drift is a data-integrity alarm: it is logged at error level and
    /// returned, never swallowed.
    #[instrument(skip(self))]
    pub async fn verify_projections(&self, warehouse_id: &WarehouseId) -> LedgerResult<()> {
        let snapshot = self.store.snapshot(warehouse_id).await?;
        let records = self
            .store
            .read_events(warehouse_id, &EventFilter::all())
            .await?;

        let rebuilt = crate::projection::WarehouseProjection::rebuild(&records)
            .map_err(StoreError::Projection)?;
        if let Err(drift) = snapshot.projection.verify_against(&rebuilt) {
            error!(%drift, "projection drift detected");
            return Err(LedgerError::ProjectionDrift {
                warehouse: warehouse_id.clone(),
                detail: drift.to_string(),
            });
        }
        Ok(())
    }

    /// Runs [`Ledger::verify_projections`] for every registered warehouse.
    pub async fn verify_all_projections(&self) -> LedgerResult<()> {
        for warehouse in self.store.warehouses().await? {
            self.verify_projections(&warehouse.id).await?;
        }
        Ok(())
    }

    /// Administrative cascade: removes the warehouse and everything it
    /// owns, in dependency order.
    #[instrument(skip(self))]
    pub async fn delete_warehouse(&self, warehouse_id: &WarehouseId) -> LedgerResult<()> {
        self.store.delete_warehouse(warehouse_id).await?;
        info!("warehouse deleted");
        Ok(())
    }

    async fn decide_request(
        &self,
        warehouse_id: &WarehouseId,
        actor_id: &ActorId,
        request_id: RequestId,
        decision: RequestStatus,
        reason: Option<String>,
    ) -> LedgerResult<RequestProjection> {
        let (snapshot, records) = self
            .commit_with_retry(warehouse_id, |snapshot| {
                let request = snapshot
                    .projection
                    .request(request_id)
                    .ok_or(LedgerError::RequestNotFound(request_id))?;
                if !request.status.can_transition_to(decision) {
                    return Err(LedgerError::InvalidTransition {
                        request_id,
                        from: request.status,
                        to: decision,
                    });
                }
                let payload = match decision {
                    RequestStatus::Approved => InventoryEvent::OutboundApproved { request_id },
                    RequestStatus::Rejected => InventoryEvent::OutboundRejected {
                        request_id,
                        reason: reason.clone(),
                    },
                    _ => return Err(internal("decide_request only approves or rejects")),
                };
                Ok(vec![EventToAppend::new(actor_id.clone(), payload)])
            })
            .await?;

        let record = records
            .first()
            .ok_or_else(|| internal("commit returned no records"))?;
        let mut request = snapshot
            .projection
            .request(request_id)
            .cloned()
            .ok_or(LedgerError::RequestNotFound(request_id))?;
        request
            .transition(decision, record.recorded_at)
            .map_err(StoreError::Projection)?;
        if decision == RequestStatus::Rejected {
            request.rejection_reason = reason;
        }
        info!(request_id = %request_id, status = %decision, "request decided");
        Ok(request)
    }

    /// Snapshot, decide, append with the snapshot's version; retry on
    /// contention with jittered backoff.
    async fn commit_with_retry<F>(
        &self,
        warehouse_id: &WarehouseId,
        build: F,
    ) -> LedgerResult<(WarehouseSnapshot, Vec<EventRecord>)>
    where
        F: Fn(&WarehouseSnapshot) -> LedgerResult<Vec<EventToAppend>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let snapshot = self.store.snapshot(warehouse_id).await?;
            let events = build(&snapshot)?;
            match self
                .store
                .append(warehouse_id, ExpectedVersion::Exact(snapshot.version), events)
                .await
            {
                Ok((_, records)) => return Ok((snapshot, records)),
                Err(StoreError::VersionConflict { .. }) if attempt + 1 < self.retry.max_attempts => {
                    warn!(
                        warehouse_id = %warehouse_id,
                        attempt = attempt + 1,
                        "write contention, retrying with fresh state"
                    );
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Issues the next sequence number for a (crop, local date) key and builds
/// the batch seed carrying it.
///
/// `staged` tracks numbers already issued within the current commit so a
/// multi-entry genesis numbers its batches densely.
fn seed_batch(
    snapshot: &WarehouseSnapshot,
    staged: &mut BTreeMap<SequenceKey, SequenceNumber>,
    crop: &CropType,
    source: BatchSource,
    bags: BagQuantity,
) -> BatchSeed {
    let date = snapshot.warehouse.local_date(Timestamp::now());
    let key = SequenceKey {
        warehouse_id: snapshot.warehouse.id.clone(),
        crop: crop.clone(),
        date,
    };
    let sequence = staged.get(&key).map_or_else(
        || snapshot.projection.next_sequence(&key),
        |issued| issued.next(),
    );
    staged.insert(key, sequence);

    BatchSeed {
        batch_id: crate::types::BatchId::new(),
        code: format_batch_code(crop, date, &snapshot.warehouse.code, sequence),
        crop: crop.clone(),
        source,
        bags,
        sequence,
        sequence_date: date,
    }
}

fn internal(message: &str) -> LedgerError {
    LedgerError::Store(StoreError::Internal(message.to_string()))
}
