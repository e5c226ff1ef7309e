//! Warehouse identity and timezone-aware date bucketing.
//!
//! Timestamps are stored in UTC everywhere. Whenever a calendar date is
//! needed (batch sequence buckets, daily reports), the conversion goes
//! through the warehouse's configured timezone explicitly. Implicit
//! server-local or UTC date casts are how "today" filters silently shift
//! by a day, so they are not offered.

use crate::types::{Timestamp, WarehouseCode, WarehouseId, WarehouseName};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A registered warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    /// Unique identifier
    pub id: WarehouseId,
    /// Human-readable name shown in audit views
    pub name: WarehouseName,
    /// Short code embedded in batch codes
    pub code: WarehouseCode,
    /// Timezone used for all date bucketing at this warehouse
    pub timezone: Tz,
    /// When the warehouse was registered
    pub created_at: Timestamp,
}

impl Warehouse {
    /// Converts a UTC instant to the calendar date at this warehouse.
    ///
    /// This is the only sanctioned way to bucket timestamps by day.
    pub fn local_date(&self, at: Timestamp) -> NaiveDate {
        at.as_datetime().with_timezone(&self.timezone).date_naive()
    }
}

/// Input for registering a new warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWarehouse {
    /// Identifier; generate with `WarehouseId::generate()` if none exists
    pub id: WarehouseId,
    /// Human-readable name
    pub name: WarehouseName,
    /// Short code for batch codes; must be unique among warehouses
    pub code: WarehouseCode,
    /// Timezone for date bucketing
    pub timezone: Tz,
}

impl NewWarehouse {
    /// Stamps the registration into a `Warehouse` entity.
    pub fn into_warehouse(self, created_at: Timestamp) -> Warehouse {
        Warehouse {
            id: self.id,
            name: self.name,
            code: self.code,
            timezone: self.timezone,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn warehouse_in(tz: Tz) -> Warehouse {
        Warehouse {
            id: WarehouseId::try_new("wh-1").unwrap(),
            name: WarehouseName::try_new("Kumasi Central").unwrap(),
            code: WarehouseCode::try_new("WH01").unwrap(),
            timezone: tz,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn local_date_matches_utc_for_utc_warehouses() {
        let warehouse = warehouse_in(chrono_tz::UTC);
        let at = Timestamp::new(Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap());
        assert_eq!(
            warehouse.local_date(at),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn local_date_shifts_across_midnight_for_eastern_timezones() {
        // 23:30 UTC is already the next day in Nairobi (UTC+3).
        let warehouse = warehouse_in(chrono_tz::Africa::Nairobi);
        let at = Timestamp::new(Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 0).unwrap());
        assert_eq!(
            warehouse.local_date(at),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()
        );
    }

    #[test]
    fn local_date_shifts_back_for_western_timezones() {
        // 01:30 UTC is still the previous evening in New York (UTC-5).
        let warehouse = warehouse_in(chrono_tz::America::New_York);
        let at = Timestamp::new(Utc.with_ymd_and_hms(2024, 1, 16, 1, 30, 0).unwrap());
        assert_eq!(
            warehouse.local_date(at),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn warehouse_roundtrip_serialization() {
        let warehouse = warehouse_in(chrono_tz::Africa::Accra);
        let json = serde_json::to_string(&warehouse).unwrap();
        let deserialized: Warehouse = serde_json::from_str(&json).unwrap();
        assert_eq!(warehouse, deserialized);
    }
}
