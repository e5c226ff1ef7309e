//! Core domain types for the granary inventory ledger.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle. Once a value of one of
//! these types exists, it is guaranteed valid everywhere in the system.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a warehouse, the unit of concurrency in the ledger.
///
/// `WarehouseId` values are guaranteed to be non-empty and at most
/// 64 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct WarehouseId(String);

impl WarehouseId {
    /// Generates a new unique `WarehouseId`.
    pub fn generate() -> Self {
        Self::try_new(format!("wh-{}", Uuid::now_v7()))
            .expect("generated warehouse id is always valid")
    }
}

/// Short warehouse code embedded in batch codes (e.g. `WH01`).
///
/// Codes are uppercased on construction and restricted to 2-12
/// alphanumeric characters so that the batch code format stays parseable.
#[nutype(
    sanitize(trim, uppercase),
    validate(regex = r"^[A-Z0-9]{2,12}$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct WarehouseCode(String);

/// Human-readable warehouse name shown in audit views.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct WarehouseName(String);

/// Crop type of a batch (e.g. `MAIZE`, `SOYA_BEANS`).
///
/// Uppercased on construction; the value is embedded verbatim in batch
/// codes, so the alphabet is restricted accordingly.
#[nutype(
    sanitize(trim, uppercase),
    validate(regex = r"^[A-Z0-9_]{1,32}$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CropType(String);

/// Identifier of the user or system that initiated an event.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ActorId(String);

/// A strictly positive count of bags.
///
/// Used for requested and initial quantities. Remaining-bag counters are
/// plain `u32` values owned by [`crate::batch::Batch`], where zero is a
/// legal state.
#[nutype(
    validate(greater = 0),
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
pub struct BagQuantity(u32);

impl BagQuantity {
    /// Returns the raw bag count.
    pub fn get(self) -> u32 {
        self.into()
    }
}

/// A globally unique event identifier using UUIDv7 format.
///
/// UUIDv7 provides time-based ordering, which is used to break ties in the
/// canonical history order when two events share a timestamp.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier of a batch, UUIDv7 format.
///
/// The id doubles as the deterministic tie-breaker for FIFO ordering when
/// two batches share a creation timestamp.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Creates a new `BatchId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier of an outbound dispatch request, UUIDv7 format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new `RequestId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier of a batch allocation row, UUIDv7 format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct AllocationId(Uuid);

impl AllocationId {
    /// Creates a new `AllocationId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for AllocationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of a batch within its (warehouse, crop, date) sequence.
///
/// Sequences start at 1 and increase densely; the value drives the numeric
/// suffix of the batch code.
#[nutype(
    validate(greater_or_equal = 1),
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
pub struct SequenceNumber(u32);

impl SequenceNumber {
    /// The first sequence number issued for a new key.
    pub fn first() -> Self {
        Self::try_new(1).expect("1 is always a valid sequence number")
    }

    /// Returns the next sequence number after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u32 = self.into();
        Self::try_new(current + 1).expect("next sequence number should always be valid")
    }

    /// Returns the raw counter value.
    pub fn get(self) -> u32 {
        self.into()
    }
}

/// A persisted, externally-visible batch identifier.
///
/// The format `{CROP}-{YYYYMMDD}-{WAREHOUSE_CODE}-{SEQ}` is printed on
/// physical labels and scanned QR codes, so it must never change. Values
/// are constructed only by [`crate::codegen::format_batch_code`].
#[nutype(
    validate(regex = r"^[A-Z0-9_]+-[0-9]{8}-[A-Z0-9]+-[0-9]{3,}$"),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct BatchCode(String);

/// A timestamp for when an event occurred or a batch was created.
///
/// Always UTC. Date bucketing for sequences and reports converts through
/// an explicit warehouse timezone, never through an implicit local cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl AsRef<DateTime<Utc>> for Timestamp {
    fn as_ref(&self) -> &DateTime<Utc> {
        self.as_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
