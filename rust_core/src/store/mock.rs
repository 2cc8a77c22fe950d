//! In-memory store double for unit tests: reads come from preloaded
//! fixtures, writes are recorded for assertions.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::PriceStore;
use crate::models::{ChangeRow, ListingRow, PublishedAggregate};

pub(crate) struct MockStore {
    cursor: AtomicI64,
    listings: Mutex<Vec<ListingRow>>,
    changes: Mutex<Vec<ChangeRow>>,
    fail_changes_read: AtomicBool,
    /// Row count reported by single-row publishes.
    publish_affected: AtomicU64,
    invalidate_all_calls: AtomicU64,
    scoped_invalidations: Mutex<Vec<i64>>,
    bulk_batches: Mutex<Vec<Vec<PublishedAggregate>>>,
    published: Mutex<Vec<PublishedAggregate>>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self {
            cursor: AtomicI64::new(0),
            listings: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            fail_changes_read: AtomicBool::new(false),
            publish_affected: AtomicU64::new(1),
            invalidate_all_calls: AtomicU64::new(0),
            scoped_invalidations: Mutex::new(Vec::new()),
            bulk_batches: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_cursor(&self, cursor: i64) {
        self.cursor.store(cursor, Ordering::SeqCst);
    }

    pub(crate) fn set_listings(&self, rows: Vec<ListingRow>) {
        *self.listings.lock().unwrap() = rows;
    }

    /// Stage the delta the next changes read returns.
    pub(crate) fn set_changes(&self, rows: Vec<ChangeRow>) {
        *self.changes.lock().unwrap() = rows;
    }

    pub(crate) fn fail_next_changes_read(&self) {
        self.fail_changes_read.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_publish_affected(&self, affected: u64) {
        self.publish_affected.store(affected, Ordering::SeqCst);
    }

    pub(crate) fn invalidate_all_calls(&self) -> u64 {
        self.invalidate_all_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn scoped_invalidations(&self) -> Vec<i64> {
        self.scoped_invalidations.lock().unwrap().clone()
    }

    pub(crate) fn bulk_batches(&self) -> Vec<Vec<PublishedAggregate>> {
        self.bulk_batches.lock().unwrap().clone()
    }

    pub(crate) fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub(crate) fn last_published(&self) -> Option<PublishedAggregate> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Every store write observed so far, of any kind.
    pub(crate) fn total_writes(&self) -> usize {
        self.invalidate_all_calls.load(Ordering::SeqCst) as usize
            + self.scoped_invalidations.lock().unwrap().len()
            + self.bulk_batches.lock().unwrap().len()
            + self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl PriceStore for MockStore {
    async fn read_current_cursor(&self) -> Result<i64> {
        Ok(self.cursor.load(Ordering::SeqCst))
    }

    async fn read_all_active_listings(&self) -> Result<Vec<ListingRow>> {
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn read_changes_since(&self, _cursor: i64) -> Result<Vec<ChangeRow>> {
        if self.fail_changes_read.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("change stream unavailable"));
        }
        Ok(self.changes.lock().unwrap().clone())
    }

    async fn invalidate_all_published(&self) -> Result<u64> {
        self.invalidate_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.published.lock().unwrap().len() as u64)
    }

    async fn invalidate_published_for_product(&self, product_id: i64) -> Result<u64> {
        self.scoped_invalidations.lock().unwrap().push(product_id);
        Ok(1)
    }

    async fn bulk_publish_aggregates(&self, rows: &[PublishedAggregate]) -> Result<()> {
        self.bulk_batches.lock().unwrap().push(rows.to_vec());
        Ok(())
    }

    async fn publish_aggregate(&self, row: &PublishedAggregate) -> Result<u64> {
        self.published.lock().unwrap().push(row.clone());
        Ok(self.publish_affected.load(Ordering::SeqCst))
    }
}
