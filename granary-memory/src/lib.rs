//! In-memory store adapter for the granary inventory ledger
//!
//! This crate provides an in-memory implementation of the `LedgerStore`
//! trait from the granary crate, useful for testing and development
//! scenarios where persistence is not required.
//!
//! The adapter honors the full append contract: expected-version check,
//! timestamp stamping, event persistence and projection application happen
//! under one write lock and either all take effect or none do.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use granary::errors::{StoreError, StoreResult};
use granary::event::{EventFilter, EventRecord};
use granary::projection::WarehouseProjection;
use granary::store::{EventToAppend, ExpectedVersion, LedgerStore, LogVersion, WarehouseSnapshot};
use granary::types::{Timestamp, WarehouseId};
use granary::warehouse::Warehouse;

/// Everything one warehouse owns: identity, event log, live projection
/// and the log version guarding both.
#[derive(Debug, Clone)]
struct WarehouseRecord {
    warehouse: Warehouse,
    log: Vec<EventRecord>,
    projection: WarehouseProjection,
    version: LogVersion,
}

impl WarehouseRecord {
    fn new(warehouse: Warehouse) -> Self {
        Self {
            warehouse,
            log: Vec::new(),
            projection: WarehouseProjection::new(),
            version: LogVersion::initial(),
        }
    }
}

/// Thread-safe in-memory ledger store for testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    warehouses: Arc<RwLock<HashMap<WarehouseId, WarehouseRecord>>>,
}

impl InMemoryLedgerStore {
    /// Create a new empty in-memory ledger store
    pub fn new() -> Self {
        Self {
            warehouses: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn register_warehouse(&self, warehouse: Warehouse) -> StoreResult<()> {
        let mut warehouses = self.warehouses.write().expect("RwLock poisoned");
        if warehouses.contains_key(&warehouse.id) {
            return Err(StoreError::WarehouseAlreadyRegistered(warehouse.id));
        }
        warehouses.insert(warehouse.id.clone(), WarehouseRecord::new(warehouse));
        Ok(())
    }

    async fn warehouse(&self, warehouse_id: &WarehouseId) -> StoreResult<Warehouse> {
        let warehouses = self.warehouses.read().expect("RwLock poisoned");
        warehouses
            .get(warehouse_id)
            .map(|record| record.warehouse.clone())
            .ok_or_else(|| StoreError::WarehouseNotFound(warehouse_id.clone()))
    }

    async fn warehouses(&self) -> StoreResult<Vec<Warehouse>> {
        let warehouses = self.warehouses.read().expect("RwLock poisoned");
        let mut all: Vec<Warehouse> = warehouses
            .values()
            .map(|record| record.warehouse.clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn snapshot(&self, warehouse_id: &WarehouseId) -> StoreResult<WarehouseSnapshot> {
        let warehouses = self.warehouses.read().expect("RwLock poisoned");
        let record = warehouses
            .get(warehouse_id)
            .ok_or_else(|| StoreError::WarehouseNotFound(warehouse_id.clone()))?;
        Ok(WarehouseSnapshot {
            warehouse: record.warehouse.clone(),
            projection: record.projection.clone(),
            version: record.version,
        })
    }

    async fn append(
        &self,
        warehouse_id: &WarehouseId,
        expected: ExpectedVersion,
        events: Vec<EventToAppend>,
    ) -> StoreResult<(LogVersion, Vec<EventRecord>)> {
        let mut warehouses = self.warehouses.write().expect("RwLock poisoned");
        let record = warehouses
            .get_mut(warehouse_id)
            .ok_or_else(|| StoreError::WarehouseNotFound(warehouse_id.clone()))?;

        match expected {
            ExpectedVersion::New => {
                if record.version != LogVersion::initial() {
                    return Err(StoreError::VersionConflict {
                        warehouse: warehouse_id.clone(),
                        expected: LogVersion::initial(),
                        current: record.version,
                    });
                }
            }
            ExpectedVersion::Exact(version) => {
                if record.version != version {
                    return Err(StoreError::VersionConflict {
                        warehouse: warehouse_id.clone(),
                        expected: version,
                        current: record.version,
                    });
                }
            }
            ExpectedVersion::Any => {}
        }

        for event in &events {
            if record.log.iter().any(|stored| stored.event_id == event.event_id) {
                return Err(StoreError::DuplicateEventId(event.event_id));
            }
        }

        // Stamp non-decreasing timestamps so canonical history order never
        // moves a new record before an older one.
        let mut stamp = Timestamp::now();
        if let Some(last) = record.log.last() {
            if last.recorded_at > stamp {
                stamp = last.recorded_at;
            }
        }

        let stamped: Vec<EventRecord> = events
            .into_iter()
            .map(|event| EventRecord {
                event_id: event.event_id,
                warehouse_id: warehouse_id.clone(),
                actor_id: event.actor_id,
                recorded_at: stamp,
                payload: event.payload,
            })
            .collect();

        // Apply to a working copy first; a rejected event must leave the
        // stored projection, log and version untouched.
        let mut projection = record.projection.clone();
        for stamped_record in &stamped {
            projection.apply(stamped_record)?;
        }

        let mut version = record.version;
        for _ in &stamped {
            version = version.next();
        }

        record.log.extend(stamped.iter().cloned());
        record.projection = projection;
        record.version = version;
        Ok((version, stamped))
    }

    async fn read_events(
        &self,
        warehouse_id: &WarehouseId,
        filter: &EventFilter,
    ) -> StoreResult<Vec<EventRecord>> {
        let warehouses = self.warehouses.read().expect("RwLock poisoned");
        let record = warehouses
            .get(warehouse_id)
            .ok_or_else(|| StoreError::WarehouseNotFound(warehouse_id.clone()))?;

        let mut matching: Vec<EventRecord> = record
            .log
            .iter()
            .filter(|stored| filter.matches(stored))
            .cloned()
            .collect();
        matching.sort_by_key(EventRecord::history_key);
        Ok(matching)
    }

    async fn delete_warehouse(&self, warehouse_id: &WarehouseId) -> StoreResult<()> {
        let mut warehouses = self.warehouses.write().expect("RwLock poisoned");
        // The relational cascade collapses to one map removal here: the
        // record owns its log and projections outright.
        warehouses
            .remove(warehouse_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::WarehouseNotFound(warehouse_id.clone()))
    }
}
