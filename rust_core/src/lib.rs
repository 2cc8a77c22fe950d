//! BestPrice Core - incremental per-product best-price aggregation.
//!
//! This library provides:
//! - Per-product order-statistics books (min/max/count over live listings)
//! - A lazily-populated product registry with bulk invalidate/publish
//! - A change stream consumer: bootstrap load, per-tick delta classification
//!   and replay, cursor advancement
//! - The backing store seam (trait + Postgres implementation)
//! - Database pool configuration and health checking

pub mod consumer;
pub mod db;
pub mod models;
pub mod price_book;
pub mod registry;
pub mod store;

pub use consumer::{BootstrapSummary, ChangeStreamConsumer, ClassifyError, TickSummary};
pub use models::{
    BestPriceSnapshot, ChangeRow, EventType, ListingPrice, ListingRow, PriceEvent,
    PublishedAggregate, UNSET_PRICE,
};
pub use price_book::PriceBook;
pub use registry::BookRegistry;
pub use store::{PgPriceStore, PriceStore};
