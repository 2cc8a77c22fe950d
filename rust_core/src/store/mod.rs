//! Backing store abstractions for the aggregation engine
//!
//! Defines the PriceStore trait the engine runs against: the live listing
//! table and its change stream on the read side, the published aggregate
//! table on the write side. Production uses the Postgres implementation;
//! tests run against in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChangeRow, ListingRow, PublishedAggregate};

#[cfg(test)]
pub(crate) mod mock;
pub mod postgres;

pub use postgres::PgPriceStore;

/// Store operations the aggregation engine needs.
///
/// Reads are ordered: listing and change fetches come back ascending by
/// (product id, price) so replay touches one product at a time.
/// Invalidations are soft deletes; publishes insert fresh rows.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Current position of the upstream change stream.
    async fn read_current_cursor(&self) -> Result<i64>;

    /// Every active, non-deleted listing, for the bootstrap load.
    async fn read_all_active_listings(&self) -> Result<Vec<ListingRow>>;

    /// Net change rows with sequence strictly greater than `cursor`.
    async fn read_changes_since(&self, cursor: i64) -> Result<Vec<ChangeRow>>;

    /// Soft-delete every published aggregate. Returns affected row count.
    async fn invalidate_all_published(&self) -> Result<u64>;

    /// Soft-delete one product's published aggregate. Returns affected row count.
    async fn invalidate_published_for_product(&self, product_id: i64) -> Result<u64>;

    /// Publish a batch of aggregates in one statement.
    async fn bulk_publish_aggregates(&self, rows: &[PublishedAggregate]) -> Result<()>;

    /// Publish one product's aggregate. Returns affected row count,
    /// expected to be exactly 1.
    async fn publish_aggregate(&self, row: &PublishedAggregate) -> Result<u64>;
}
