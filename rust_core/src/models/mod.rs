// Shared models for the best-price aggregation services
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Listings
// ============================================================================

/// Sentinel for min/max when a product has no live listings. Prices are
/// non-negative, so -1.0 is unambiguous.
pub const UNSET_PRICE: f64 = -1.0;

/// One live listing price inside a product's ordered set.
/// At most one live entry per listing id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListingPrice {
    pub listing_id: i64,
    pub price: f64,
}

impl ListingPrice {
    pub fn new(listing_id: i64, price: f64) -> Self {
        Self { listing_id, price }
    }
}

/// A listing row as read from the backing store during bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub product_id: i64,
    pub listing_id: i64,
    pub price: f64,
}

// ============================================================================
// Aggregates
// ============================================================================

/// The published triple for one product: smallest and largest live listing
/// price plus the live listing count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestPriceSnapshot {
    pub min_price: f64,
    pub max_price: f64,
    pub listing_count: usize,
}

impl BestPriceSnapshot {
    /// Snapshot of a product with no live listings.
    pub fn unset() -> Self {
        Self {
            min_price: UNSET_PRICE,
            max_price: UNSET_PRICE,
            listing_count: 0,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.listing_count == 0
    }
}

/// One row of the published aggregate table, ready to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedAggregate {
    pub product_id: i64,
    pub price_min: f64,
    pub price_max: f64,
    pub listing_count: i64,
    pub published_at: DateTime<Utc>,
}

// ============================================================================
// Change Stream
// ============================================================================

/// Raw operation codes carried by change-tracking rows.
pub mod change_ops {
    pub const INSERT: &str = "I";
    pub const UPDATE: &str = "U";
    pub const DELETE: &str = "D";
}

/// One raw change-tracking row, exactly as fetched from the store.
/// `operation` stays a raw string until classification; anything outside
/// `change_ops` is a classification failure, not a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub product_id: i64,
    pub listing_id: i64,
    pub price: f64,
    pub is_active: i32,
    pub is_deleted: i32,
    pub operation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// A classified change, ready to replay against an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub product_id: i64,
    pub listing_id: i64,
    pub event_type: EventType,
    pub price: f64,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_snapshot() {
        let snap = BestPriceSnapshot::unset();
        assert!(snap.is_unset());
        assert_eq!(snap.min_price, UNSET_PRICE);
        assert_eq!(snap.max_price, UNSET_PRICE);
        assert_eq!(snap.listing_count, 0);
    }

    #[test]
    fn test_event_type_serialization() {
        let json = serde_json::to_string(&EventType::Insert).unwrap();
        assert_eq!(json, "\"insert\"");

        let deserialized: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, EventType::Insert);
    }

    #[test]
    fn test_change_row_serializes_for_logging() {
        let row = ChangeRow {
            product_id: 7,
            listing_id: 42,
            price: 19.99,
            is_active: 1,
            is_deleted: 0,
            operation: change_ops::UPDATE.to_string(),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"listing_id\":42"));
        assert!(json.contains("\"operation\":\"U\""));
    }
}
