//! Batch entities and allocation rows.
//!
//! A batch is a dated lot of one crop at one warehouse. Its remaining bag
//! count only ever decreases, and only through [`Batch::deduct`], which
//! refuses to go negative. A batch whose remaining count reaches zero stays
//! in the projection (allocations still reference it) but drops out of the
//! FIFO candidate set.

use crate::errors::{ProjectionError, ProjectionResult};
use crate::event::{AllocationLine, BatchSeed, BatchSource};
use crate::types::{
    AllocationId, BagQuantity, BatchCode, BatchId, CropType, RequestId, Timestamp, WarehouseId,
};
use serde::{Deserialize, Serialize};

/// A dated lot of a single crop type held at a warehouse.
///
/// Invariant: `0 <= remaining_bags <= initial_bags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identifier
    pub id: BatchId,
    /// Externally-visible batch code
    pub code: BatchCode,
    /// The warehouse that recorded this batch
    pub warehouse_id: WarehouseId,
    /// Crop type
    pub crop: CropType,
    /// Where the stock came from
    pub source: BatchSource,
    /// Bag count at creation; never changes
    pub initial_bags: BagQuantity,
    /// Bags not yet dispatched
    pub remaining_bags: u32,
    /// When the batch was recorded; drives FIFO order
    pub created_at: Timestamp,
}

impl Batch {
    /// Materializes a batch from the seed carried by an inbound event.
    pub fn from_seed(seed: &BatchSeed, warehouse_id: WarehouseId, created_at: Timestamp) -> Self {
        Self {
            id: seed.batch_id,
            code: seed.code.clone(),
            warehouse_id,
            crop: seed.crop.clone(),
            source: seed.source,
            initial_bags: seed.bags,
            remaining_bags: seed.bags.get(),
            created_at,
        }
    }

    /// Whether the batch still has bags available for allocation.
    pub const fn is_live(&self) -> bool {
        self.remaining_bags > 0
    }

    /// Bags already allocated away from this batch.
    pub fn allocated_bags(&self) -> u32 {
        self.initial_bags.get() - self.remaining_bags
    }

    /// Removes `amount` bags from the batch.
    ///
    /// Fails with [`ProjectionError::Overdraw`] if fewer bags remain; the
    /// batch is left untouched in that case.
    pub fn deduct(&mut self, amount: BagQuantity) -> ProjectionResult<()> {
        let amount = amount.get();
        if amount > self.remaining_bags {
            return Err(ProjectionError::Overdraw {
                batch_id: self.id,
                requested: amount,
                remaining: self.remaining_bags,
            });
        }
        self.remaining_bags -= amount;
        Ok(())
    }

    /// Sort key for FIFO allocation: oldest first, batch id breaks ties
    /// deterministically.
    pub const fn fifo_key(&self) -> (Timestamp, BatchId) {
        (self.created_at, self.id)
    }
}

/// Join record of a dispatch against a batch. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAllocation {
    /// Unique identifier
    pub id: AllocationId,
    /// The dispatched request
    pub request_id: RequestId,
    /// The batch the bags were taken from
    pub batch_id: BatchId,
    /// Bags taken
    pub bags: BagQuantity,
}

impl BatchAllocation {
    /// Builds the allocation row recorded for one line of a dispatch.
    pub const fn from_line(request_id: RequestId, line: &AllocationLine) -> Self {
        Self {
            id: line.allocation_id,
            request_id,
            batch_id: line.batch_id,
            bags: line.bags,
        }
    }
}
