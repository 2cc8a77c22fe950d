//! Change stream consumption.
//!
//! `ChangeStreamConsumer` owns the cursor into the upstream change stream
//! and the product registry behind it. It runs the one-time bootstrap load,
//! then per-tick delta processing: fetch rows past the cursor, classify them
//! into price events, replay the events through the registry, advance the
//! cursor. Rows that fail classification are dropped and counted, never
//! retried; a failed fetch leaves the cursor where it was.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{
    change_ops, BestPriceSnapshot, ChangeRow, EventType, ListingPrice, PriceEvent,
};
use crate::registry::BookRegistry;
use crate::store::PriceStore;

// ============================================================================
// Classification
// ============================================================================

/// A change row whose raw operation has no mapping to a price event.
#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("unsupported change tracking operation {operation:?} for listing {listing_id}")]
    UnsupportedOperation { operation: String, listing_id: i64 },
}

/// Map one raw change row to a price event.
///
/// Inserts and deletes pass through. An update only counts as a re-price
/// while the listing is still live; an update that soft-deletes or
/// deactivates the listing removes it from the best-price computation, so
/// it is demoted to a delete. Any other operation code is an error.
pub fn classify(row: &ChangeRow, occurred_at: DateTime<Utc>) -> Result<PriceEvent, ClassifyError> {
    let event_type = match row.operation.as_str() {
        change_ops::INSERT => EventType::Insert,
        change_ops::DELETE => EventType::Delete,
        change_ops::UPDATE => {
            if row.is_deleted == 0 && row.is_active == 1 {
                EventType::Update
            } else {
                EventType::Delete
            }
        }
        _ => {
            return Err(ClassifyError::UnsupportedOperation {
                operation: row.operation.clone(),
                listing_id: row.listing_id,
            })
        }
    };

    Ok(PriceEvent {
        product_id: row.product_id,
        listing_id: row.listing_id,
        event_type,
        price: row.price,
        occurred_at,
    })
}

// ============================================================================
// Run summaries
// ============================================================================

/// What one bootstrap run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSummary {
    /// Cursor captured before the full load; incremental ticks start here.
    pub cursor: i64,
    pub listings_loaded: usize,
    pub products: usize,
    pub invalidated: u64,
    pub published: usize,
}

/// What one incremental tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickSummary {
    pub cursor: i64,
    pub rows_fetched: usize,
    pub events_applied: usize,
    pub classification_failures: usize,
}

// ============================================================================
// Consumer
// ============================================================================

/// Single-writer consumer of the listing change stream.
///
/// Holds the only cursor and the only registry; the driving loop must not
/// overlap calls. Nothing here is persisted, so every process start goes
/// through `bootstrap` again.
pub struct ChangeStreamConsumer {
    store: Arc<dyn PriceStore>,
    registry: BookRegistry,
    last_processed_cursor: i64,
}

impl ChangeStreamConsumer {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self {
            store,
            registry: BookRegistry::new(),
            last_processed_cursor: 0,
        }
    }

    #[inline]
    pub fn last_processed_cursor(&self) -> i64 {
        self.last_processed_cursor
    }

    pub fn registry(&self) -> &BookRegistry {
        &self.registry
    }

    /// Current aggregate for one product, if it has a book.
    pub fn aggregate(&self, product_id: i64) -> Option<BestPriceSnapshot> {
        self.registry.book(product_id).map(|book| book.snapshot())
    }

    /// One-time full rebuild. Captures the cursor first, then loads every
    /// active listing, soft-deletes all previously published aggregates,
    /// folds the listings into their books purely in memory, and pushes the
    /// whole registry in a single bulk publish. Must run exactly once,
    /// before any `process_updates` call.
    pub async fn bootstrap(&mut self) -> Result<BootstrapSummary> {
        let started = Instant::now();

        let cursor = self.store.read_current_cursor().await?;
        info!("Bootstrap: change stream cursor at {}", cursor);

        let listings = self.store.read_all_active_listings().await?;
        info!("Bootstrap: loaded {} active listings", listings.len());

        let invalidated = self.registry.invalidate_all_published(self.store.as_ref()).await?;

        let store = Arc::clone(&self.store);
        for row in &listings {
            let book = self.registry.book_mut(row.product_id);
            let listing = ListingPrice::new(row.listing_id, row.price);
            book.insert(listing, false, true, store.as_ref()).await?;
        }
        info!(
            "Bootstrap: computed aggregates in memory for {} products",
            self.registry.product_count()
        );

        let published = self.registry.publish_all_snapshots(store.as_ref()).await?;
        info!(
            "Bootstrap: published {} aggregates in {:.2}s",
            published,
            started.elapsed().as_secs_f64()
        );

        self.last_processed_cursor = cursor;
        Ok(BootstrapSummary {
            cursor,
            listings_loaded: listings.len(),
            products: self.registry.product_count(),
            invalidated,
            published,
        })
    }

    /// One incremental tick. A cursor that has not moved is a no-op.
    /// Otherwise every change row past the cursor is classified up front,
    /// the classified events are replayed with publishing on, and the cursor
    /// advances to the value read at the start. The advance happens even
    /// when some rows were dropped: those rows are skipped for good.
    pub async fn process_updates(&mut self) -> Result<TickSummary> {
        let current = self.store.read_current_cursor().await?;
        if current <= self.last_processed_cursor {
            debug!(
                "No new changes, cursor still at {}",
                self.last_processed_cursor
            );
            return Ok(TickSummary {
                cursor: self.last_processed_cursor,
                ..TickSummary::default()
            });
        }

        debug!(
            "Change stream cursor at {}, fetching delta since {}",
            current, self.last_processed_cursor
        );
        let rows = self
            .store
            .read_changes_since(self.last_processed_cursor)
            .await?;

        let occurred_at = Utc::now();
        let mut events = Vec::with_capacity(rows.len());
        let mut failures = 0usize;
        for row in &rows {
            match classify(row, occurred_at) {
                Ok(event) => events.push(event),
                Err(err) => {
                    failures += 1;
                    error!(
                        "Dropping change row: {}: {}",
                        err,
                        serde_json::to_string(row).unwrap_or_default()
                    );
                }
            }
        }
        debug!(
            "Classified {} of {} change rows, {} failures",
            events.len(),
            rows.len(),
            failures
        );

        let applied = self.replay(&events).await?;
        self.last_processed_cursor = current;

        info!(
            "Processed changes through cursor {}: {} events applied, {} rows dropped",
            current, applied, failures
        );
        Ok(TickSummary {
            cursor: current,
            rows_fetched: rows.len(),
            events_applied: applied,
            classification_failures: failures,
        })
    }

    /// Replay classified events through their books with publishing on.
    /// The per-product invalidation is suppressed only for an insert that
    /// creates a brand-new book: that product has nothing published yet.
    async fn replay(&mut self, events: &[PriceEvent]) -> Result<usize> {
        let store = Arc::clone(&self.store);
        let mut applied = 0usize;

        for event in events {
            let brand_new = !self.registry.contains(event.product_id);
            let listing = ListingPrice::new(event.listing_id, event.price);
            let book = self.registry.book_mut(event.product_id);

            match event.event_type {
                EventType::Insert => {
                    book.insert(listing, true, brand_new, store.as_ref()).await?
                }
                EventType::Update => book.update(listing, true, store.as_ref()).await?,
                EventType::Delete => {
                    book.delete(event.listing_id, true, store.as_ref()).await?
                }
            }
            applied += 1;
        }
        Ok(applied)
    }
}
