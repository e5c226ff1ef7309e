//! Batch code generation.
//!
//! Codes follow the persisted, externally-visible format
//! `{CROP}-{YYYYMMDD}-{WAREHOUSE_CODE}-{SEQ}` with the sequence zero-padded
//! to three digits (e.g. `MAIZE-20240115-WH01-003`). Printed labels and
//! scanned QR codes reference these values, so the format must be preserved
//! exactly.
//!
//! The per-key counter that drives the suffix lives in the warehouse
//! projection and advances inside the same versioned commit as the batch
//! creation and the inbound event append. A rolled-back inbound therefore
//! also rolls back the sequence advance, and two concurrent inbounds for
//! the same key can never be issued the same number: the loser's commit is
//! rejected on the version check and its retry observes the advanced
//! counter.

use crate::types::{BatchCode, CropType, SequenceNumber, WarehouseCode, WarehouseId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Key of a batch sequence counter: one counter per warehouse, crop and
/// warehouse-local calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    /// The warehouse issuing the code
    pub warehouse_id: WarehouseId,
    /// Crop type of the batch
    pub crop: CropType,
    /// Warehouse-local date bucket
    pub date: NaiveDate,
}

impl std::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.warehouse_id,
            self.crop,
            self.date.format("%Y%m%d")
        )
    }
}

/// Formats a batch code from its parts.
///
/// The sequence is zero-padded to three digits; wider sequences keep their
/// natural width (the 1000th batch of a key on one day is `...{-}1000`).
pub fn format_batch_code(
    crop: &CropType,
    date: NaiveDate,
    warehouse_code: &WarehouseCode,
    sequence: SequenceNumber,
) -> BatchCode {
    let raw = format!(
        "{crop}-{date}-{warehouse_code}-{seq:03}",
        date = date.format("%Y%m%d"),
        seq = sequence.get(),
    );
    BatchCode::try_new(raw).expect("formatted batch code always matches the batch code shape")
}
