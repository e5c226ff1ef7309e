//! Domain events for the inventory ledger.
//!
//! Events are immutable facts and the single source of truth for history.
//! Every other entity in the system (batches, sequences, allocations, the
//! request and stock projections) is derived by folding these events, which
//! is what makes full rebuilds possible.
//!
//! Wire names (`STOCK_INBOUND_RECORDED`, ...) are part of the persisted
//! format and must not change.

use crate::types::{
    ActorId, AllocationId, BagQuantity, BatchCode, BatchId, CropType, EventId, RequestId,
    SequenceNumber, Timestamp, WarehouseId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where the stock in a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchSource {
    /// Initial inventory recorded before the warehouse became active.
    Genesis,
    /// Stock delivered to the warehouse.
    Delivery,
    /// Stock transferred in from another warehouse.
    Transfer,
}

impl std::fmt::Display for BatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Genesis => write!(f, "GENESIS"),
            Self::Delivery => write!(f, "DELIVERY"),
            Self::Transfer => write!(f, "TRANSFER"),
        }
    }
}

/// Full description of a batch at creation time, embedded in inbound events.
///
/// The seed carries the issued sequence number and the warehouse-local date
/// it was bucketed under, so that replaying the log rebuilds the sequence
/// counters exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSeed {
    /// Identifier of the created batch
    pub batch_id: BatchId,
    /// The generated, externally-visible batch code
    pub code: BatchCode,
    /// Crop type of the batch
    pub crop: CropType,
    /// Where the stock came from
    pub source: BatchSource,
    /// Initial (and at creation, remaining) bag count
    pub bags: BagQuantity,
    /// Sequence number issued for (warehouse, crop, `sequence_date`)
    pub sequence: SequenceNumber,
    /// Warehouse-local date the sequence was bucketed under
    pub sequence_date: NaiveDate,
}

/// One batch's share of a dispatch, embedded in `DISPATCH_EXECUTED` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    /// Identifier of the allocation row
    pub allocation_id: AllocationId,
    /// The batch the bags were taken from
    pub batch_id: BatchId,
    /// Bags taken from that batch
    pub bags: BagQuantity,
}

/// A domain occurrence in one warehouse's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InventoryEvent {
    /// Initial inventory recorded before the warehouse became active.
    #[serde(rename = "GENESIS_INVENTORY_RECORDED")]
    GenesisInventoryRecorded {
        /// One batch per crop lot in the opening count
        batches: Vec<BatchSeed>,
    },

    /// Stock arrived and was recorded as a new dated batch.
    #[serde(rename = "STOCK_INBOUND_RECORDED")]
    StockInboundRecorded {
        /// The created batch
        batch: BatchSeed,
    },

    /// An outbound dispatch was requested.
    #[serde(rename = "OUTBOUND_REQUESTED")]
    OutboundRequested {
        /// Identifier of the new request
        request_id: RequestId,
        /// Crop requested
        crop: CropType,
        /// Bags requested
        bags: BagQuantity,
    },

    /// A pending outbound request was approved.
    #[serde(rename = "OUTBOUND_APPROVED")]
    OutboundApproved {
        /// The approved request
        request_id: RequestId,
    },

    /// A pending outbound request was rejected. Terminal.
    #[serde(rename = "OUTBOUND_REJECTED")]
    OutboundRejected {
        /// The rejected request
        request_id: RequestId,
        /// Optional operator-supplied reason
        reason: Option<String>,
    },

    /// An approved request was dispatched; stock left the warehouse.
    #[serde(rename = "DISPATCH_EXECUTED")]
    DispatchExecuted {
        /// The executed request
        request_id: RequestId,
        /// Per-batch allocation detail, FIFO order
        allocations: Vec<AllocationLine>,
    },
}

/// Fieldless mirror of the event types, used for filtering and audit views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `GENESIS_INVENTORY_RECORDED`
    GenesisInventoryRecorded,
    /// `STOCK_INBOUND_RECORDED`
    StockInboundRecorded,
    /// `OUTBOUND_REQUESTED`
    OutboundRequested,
    /// `OUTBOUND_APPROVED`
    OutboundApproved,
    /// `OUTBOUND_REJECTED`
    OutboundRejected,
    /// `DISPATCH_EXECUTED`
    DispatchExecuted,
}

impl EventKind {
    /// The persisted wire name of this event type.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::GenesisInventoryRecorded => "GENESIS_INVENTORY_RECORDED",
            Self::StockInboundRecorded => "STOCK_INBOUND_RECORDED",
            Self::OutboundRequested => "OUTBOUND_REQUESTED",
            Self::OutboundApproved => "OUTBOUND_APPROVED",
            Self::OutboundRejected => "OUTBOUND_REJECTED",
            Self::DispatchExecuted => "DISPATCH_EXECUTED",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl InventoryEvent {
    /// The kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::GenesisInventoryRecorded { .. } => EventKind::GenesisInventoryRecorded,
            Self::StockInboundRecorded { .. } => EventKind::StockInboundRecorded,
            Self::OutboundRequested { .. } => EventKind::OutboundRequested,
            Self::OutboundApproved { .. } => EventKind::OutboundApproved,
            Self::OutboundRejected { .. } => EventKind::OutboundRejected,
            Self::DispatchExecuted { .. } => EventKind::DispatchExecuted,
        }
    }

    /// The request this event belongs to, if it is a lifecycle event.
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::OutboundRequested { request_id, .. }
            | Self::OutboundApproved { request_id }
            | Self::OutboundRejected { request_id, .. }
            | Self::DispatchExecuted { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

/// An event as it exists in the log, with identity and server timestamp.
///
/// Records are never mutated or deleted in normal operation; the only
/// bypass is the administrative warehouse-deletion cascade. Canonical
/// history order is `recorded_at` ascending with ties broken by `event_id`
/// ascending (UUIDv7, so ties resolve to insertion order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier of this record
    pub event_id: EventId,
    /// The warehouse whose history this record belongs to
    pub warehouse_id: WarehouseId,
    /// The user or system that initiated the event
    pub actor_id: ActorId,
    /// Server-assigned timestamp
    pub recorded_at: Timestamp,
    /// The domain occurrence
    pub payload: InventoryEvent,
}

impl EventRecord {
    /// Key defining the canonical position of this record in history.
    pub const fn history_key(&self) -> (Timestamp, EventId) {
        (self.recorded_at, self.event_id)
    }
}

/// Filter for reading a warehouse's event history.
///
/// Reads are finite, ordered and restartable: the same filter issued twice
/// against an unchanged log returns the same records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only return events of these kinds (None = all kinds)
    pub kinds: Option<Vec<EventKind>>,
    /// Only return lifecycle events for this request
    pub request_id: Option<RequestId>,
    /// Only return events recorded at or after this instant
    pub since: Option<Timestamp>,
    /// Only return events recorded at or before this instant
    pub until: Option<Timestamp>,
}

impl EventFilter {
    /// Creates an empty filter that matches every event.
    pub const fn all() -> Self {
        Self {
            kinds: None,
            request_id: None,
            since: None,
            until: None,
        }
    }

    /// Restricts the filter to the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Restricts the filter to one request's lifecycle events.
    #[must_use]
    pub const fn for_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Restricts the filter to events at or after `since`.
    #[must_use]
    pub const fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Restricts the filter to events at or before `until`.
    #[must_use]
    pub const fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Whether the given record passes this filter.
    pub fn matches(&self, record: &EventRecord) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&record.payload.kind()) {
                return false;
            }
        }
        if let Some(request_id) = self.request_id {
            if record.payload.request_id() != Some(request_id) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.recorded_at > until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_seed() -> BatchSeed {
        BatchSeed {
            batch_id: BatchId::new(),
            code: BatchCode::try_new("MAIZE-20240115-WH01-001").unwrap(),
            crop: CropType::try_new("MAIZE").unwrap(),
            source: BatchSource::Delivery,
            bags: BagQuantity::try_new(40).unwrap(),
            sequence: SequenceNumber::first(),
            sequence_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    fn record(payload: InventoryEvent) -> EventRecord {
        EventRecord {
            event_id: EventId::new(),
            warehouse_id: WarehouseId::try_new("wh-1").unwrap(),
            actor_id: ActorId::try_new("attendant-1").unwrap(),
            recorded_at: Timestamp::now(),
            payload,
        }
    }

    #[test]
    fn events_serialize_with_wire_type_names() {
        let event = InventoryEvent::StockInboundRecorded {
            batch: sample_seed(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "STOCK_INBOUND_RECORDED");

        let event = InventoryEvent::OutboundRejected {
            request_id: RequestId::new(),
            reason: Some("over quota".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OUTBOUND_REJECTED");
    }

    #[test]
    fn event_roundtrip_serialization() {
        let event = InventoryEvent::DispatchExecuted {
            request_id: RequestId::new(),
            allocations: vec![AllocationLine {
                allocation_id: AllocationId::new(),
                batch_id: BatchId::new(),
                bags: BagQuantity::try_new(8).unwrap(),
            }],
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: InventoryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn kind_matches_wire_name() {
        let event = InventoryEvent::GenesisInventoryRecorded { batches: vec![] };
        assert_eq!(event.kind().wire_name(), "GENESIS_INVENTORY_RECORDED");
        assert_eq!(event.kind().to_string(), "GENESIS_INVENTORY_RECORDED");
    }

    #[test]
    fn request_id_is_extracted_from_lifecycle_events() {
        let request_id = RequestId::new();
        let event = InventoryEvent::OutboundApproved { request_id };
        assert_eq!(event.request_id(), Some(request_id));

        let event = InventoryEvent::StockInboundRecorded {
            batch: sample_seed(),
        };
        assert_eq!(event.request_id(), None);
    }

    #[test]
    fn filter_by_kind_and_request() {
        let request_id = RequestId::new();
        let approved = record(InventoryEvent::OutboundApproved { request_id });
        let inbound = record(InventoryEvent::StockInboundRecorded {
            batch: sample_seed(),
        });

        let by_kind = EventFilter::all().with_kinds(vec![EventKind::OutboundApproved]);
        assert!(by_kind.matches(&approved));
        assert!(!by_kind.matches(&inbound));

        let by_request = EventFilter::all().for_request(request_id);
        assert!(by_request.matches(&approved));
        assert!(!by_request.matches(&inbound));
    }

    #[test]
    fn filter_by_time_window() {
        let rec = record(InventoryEvent::GenesisInventoryRecorded { batches: vec![] });
        let before = Timestamp::new(*rec.recorded_at.as_datetime() - chrono::Duration::seconds(1));
        let after = Timestamp::new(*rec.recorded_at.as_datetime() + chrono::Duration::seconds(1));

        assert!(EventFilter::all().since(before).matches(&rec));
        assert!(!EventFilter::all().since(after).matches(&rec));
        assert!(EventFilter::all().until(after).matches(&rec));
        assert!(!EventFilter::all().until(before).matches(&rec));
    }

    #[test]
    fn history_key_orders_by_time_then_id() {
        let a = record(InventoryEvent::GenesisInventoryRecorded { batches: vec![] });
        let mut b = record(InventoryEvent::GenesisInventoryRecorded { batches: vec![] });
        b.recorded_at = a.recorded_at;
        // Same timestamp: v7 event ids created later sort later.
        assert!(a.history_key() <= b.history_key());
    }
}
