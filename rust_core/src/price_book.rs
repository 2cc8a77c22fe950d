//! Per-product price aggregation.
//!
//! A `PriceBook` owns one product's live listing prices as an ascending
//! sequence plus the cached min/max/count triple derived from it. Mutations
//! keep the sequence and the cache in lock-step, compare the triple before
//! and after, and write the aggregate back to the store only when it moved.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::error;

use crate::models::{BestPriceSnapshot, ListingPrice, PublishedAggregate, UNSET_PRICE};
use crate::store::PriceStore;

/// One product's ordered listing set and derived best-price aggregate.
#[derive(Debug)]
pub struct PriceBook {
    product_id: i64,
    /// Ascending by price; equal prices keep arrival order.
    prices: Vec<ListingPrice>,
    min_price: f64,
    max_price: f64,
}

impl PriceBook {
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            prices: Vec::new(),
            min_price: UNSET_PRICE,
            max_price: UNSET_PRICE,
        }
    }

    #[inline]
    pub fn product_id(&self) -> i64 {
        self.product_id
    }

    #[inline]
    pub fn min_price(&self) -> f64 {
        self.min_price
    }

    #[inline]
    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    #[inline]
    pub fn listing_count(&self) -> usize {
        self.prices.len()
    }

    /// Current aggregate triple. Pure read.
    pub fn snapshot(&self) -> BestPriceSnapshot {
        BestPriceSnapshot {
            min_price: self.min_price,
            max_price: self.max_price,
            listing_count: self.prices.len(),
        }
    }

    /// Current aggregate as a publishable row stamped with `published_at`.
    pub fn published_row(&self, published_at: DateTime<Utc>) -> PublishedAggregate {
        PublishedAggregate {
            product_id: self.product_id,
            price_min: self.min_price,
            price_max: self.max_price,
            listing_count: self.prices.len() as i64,
            published_at,
        }
    }

    /// Add a listing to the ordered set. An id already present is replaced
    /// (treated as a price update), so replaying a batch lands on the same
    /// state. With `publish` set, a changed aggregate is written back;
    /// `skip_invalidation` elides the per-product soft delete when the
    /// product has never been published (bootstrap rows, brand-new products).
    pub async fn insert(
        &mut self,
        listing: ListingPrice,
        publish: bool,
        skip_invalidation: bool,
        store: &dyn PriceStore,
    ) -> Result<()> {
        let before = self.snapshot();
        self.remove_entry(listing.listing_id);
        self.place(listing);
        self.publish_if_changed(before, publish, skip_invalidation, store)
            .await
    }

    /// Re-price a listing: drop the old entry, place the new one, and compare
    /// the aggregate against the state before the drop. A re-price that moves
    /// neither min, max nor count performs no I/O; at most one write-back
    /// happens either way.
    pub async fn update(
        &mut self,
        listing: ListingPrice,
        publish: bool,
        store: &dyn PriceStore,
    ) -> Result<()> {
        let before = self.snapshot();
        self.remove_entry(listing.listing_id);
        self.place(listing);
        self.publish_if_changed(before, publish, false, store).await
    }

    /// Remove a listing. Absent ids are a no-op, not an error; the change
    /// stream may legitimately report a delete for a listing already gone.
    pub async fn delete(
        &mut self,
        listing_id: i64,
        publish: bool,
        store: &dyn PriceStore,
    ) -> Result<()> {
        let before = self.snapshot();
        self.remove_entry(listing_id);
        self.publish_if_changed(before, publish, false, store).await
    }

    /// Ordered placement, cheap paths first: empty set, new max appended,
    /// new min prepended, otherwise a binary-search splice. Ties land after
    /// existing equal prices so earlier arrivals keep their position.
    fn place(&mut self, listing: ListingPrice) {
        if self.prices.is_empty() {
            self.min_price = listing.price;
            self.max_price = listing.price;
            self.prices.push(listing);
        } else if listing.price > self.max_price {
            self.max_price = listing.price;
            self.prices.push(listing);
        } else if listing.price < self.min_price {
            self.min_price = listing.price;
            self.prices.insert(0, listing);
        } else {
            let idx = self
                .prices
                .partition_point(|lp| lp.price <= listing.price);
            self.prices.insert(idx, listing);
        }
    }

    /// Remove by listing id if present. Min is recomputed from the first
    /// element and max from the last, each independently; an emptied set
    /// falls back to the unset sentinel. Returns whether an entry existed.
    fn remove_entry(&mut self, listing_id: i64) -> bool {
        let idx = match self.prices.iter().position(|lp| lp.listing_id == listing_id) {
            Some(idx) => idx,
            None => return false,
        };
        self.prices.remove(idx);

        match (self.prices.first(), self.prices.last()) {
            (Some(first), Some(last)) => {
                self.min_price = first.price;
                self.max_price = last.price;
            }
            _ => {
                self.min_price = UNSET_PRICE;
                self.max_price = UNSET_PRICE;
            }
        }
        true
    }

    async fn publish_if_changed(
        &self,
        before: BestPriceSnapshot,
        publish: bool,
        skip_invalidation: bool,
        store: &dyn PriceStore,
    ) -> Result<()> {
        if !publish || self.snapshot() == before {
            return Ok(());
        }
        self.write_back(skip_invalidation, store).await
    }

    /// Push the current aggregate: soft-delete this product's previously
    /// published row (unless skipped), then insert the fresh one. A publish
    /// landing on a row count other than one is logged and accepted; memory
    /// is not rolled back.
    async fn write_back(&self, skip_invalidation: bool, store: &dyn PriceStore) -> Result<()> {
        if !skip_invalidation {
            store
                .invalidate_published_for_product(self.product_id)
                .await?;
        }

        let row = self.published_row(Utc::now());
        let affected = store.publish_aggregate(&row).await?;
        if affected != 1 {
            error!(
                "Aggregate publish for product {} affected {} rows, expected 1",
                self.product_id, affected
            );
        }
        Ok(())
    }
}
