//! FIFO dispatch allocation planning.
//!
//! The planner is a pure function over an ordered slice of live batches:
//! it never touches storage and never partially applies. The ledger feeds
//! it [`crate::projection::WarehouseProjection::live_batches`] (oldest
//! first, batch id as tie-break) and either commits the full plan together
//! with the `DISPATCH_EXECUTED` event or aborts the dispatch entirely.

use crate::batch::Batch;
use crate::event::AllocationLine;
use crate::types::{AllocationId, BagQuantity};
use thiserror::Error;

/// The live batches cannot cover the requested quantity.
///
/// Surfaced rather than silently under-delivering: the caller resolves the
/// shortfall (records more inbound stock) and retries the dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shortfall: requested {requested} bags, {available} available")]
pub struct Shortfall {
    /// Bags the dispatch asked for
    pub requested: u32,
    /// Bags available across all supplied batches
    pub available: u64,
}

/// Plans a dispatch of `requested` bags against `batches`, consuming them
/// strictly in the given order.
///
/// Each batch contributes `min(remaining, outstanding)` bags until the
/// request is satisfied. Exhausting the batches first yields
/// [`Shortfall`] and no plan. A successful plan always allocates exactly
/// `requested` bags.
pub fn plan_fifo(batches: &[&Batch], requested: BagQuantity) -> Result<Vec<AllocationLine>, Shortfall> {
    let mut outstanding = requested.get();
    let mut lines = Vec::new();

    for batch in batches {
        if outstanding == 0 {
            break;
        }
        let take = batch.remaining_bags.min(outstanding);
        if take == 0 {
            continue;
        }
        lines.push(AllocationLine {
            allocation_id: AllocationId::new(),
            batch_id: batch.id,
            bags: BagQuantity::try_new(take).expect("take is positive"),
        });
        outstanding -= take;
    }

    if outstanding > 0 {
        return Err(Shortfall {
            requested: requested.get(),
            available: batches
                .iter()
                .map(|batch| u64::from(batch.remaining_bags))
                .sum(),
        });
    }
    Ok(lines)
}
