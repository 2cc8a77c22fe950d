//! Product registry: the full product-to-book mapping plus the bulk
//! lifecycle operations bootstrap relies on.

use anyhow::Result;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::models::PublishedAggregate;
use crate::price_book::PriceBook;
use crate::store::PriceStore;

/// Owns every per-product `PriceBook`, keyed by product id. Books are
/// created lazily on first reference and live for the process lifetime.
#[derive(Debug, Default)]
pub struct BookRegistry {
    books: FxHashMap<i64, PriceBook>,
}

impl BookRegistry {
    pub fn new() -> Self {
        Self {
            books: FxHashMap::default(),
        }
    }

    /// The book for `product_id`, created empty on first reference.
    pub fn book_mut(&mut self, product_id: i64) -> &mut PriceBook {
        self.books
            .entry(product_id)
            .or_insert_with(|| PriceBook::new(product_id))
    }

    pub fn book(&self, product_id: i64) -> Option<&PriceBook> {
        self.books.get(&product_id)
    }

    /// Whether a book already exists, without creating one.
    pub fn contains(&self, product_id: i64) -> bool {
        self.books.contains_key(&product_id)
    }

    /// Number of distinct products seen so far.
    pub fn product_count(&self) -> usize {
        self.books.len()
    }

    /// Soft-delete every published aggregate ahead of a full rebuild.
    pub async fn invalidate_all_published(&self, store: &dyn PriceStore) -> Result<u64> {
        let invalidated = store.invalidate_all_published().await?;
        info!("Invalidated {} previously published aggregates", invalidated);
        Ok(invalidated)
    }

    /// Publish every book's current aggregate in one batch, dirty or not,
    /// all rows stamped with the same timestamp. Returns the row count.
    pub async fn publish_all_snapshots(&self, store: &dyn PriceStore) -> Result<usize> {
        let published_at = Utc::now();
        let rows: Vec<PublishedAggregate> = self
            .books
            .values()
            .map(|book| book.published_row(published_at))
            .collect();

        if rows.is_empty() {
            return Ok(0);
        }
        store.bulk_publish_aggregates(&rows).await?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingPrice;
    use crate::store::mock::MockStore;

    #[test]
    fn test_books_are_created_lazily() {
        let mut registry = BookRegistry::new();
        assert!(!registry.contains(1));
        assert_eq!(registry.product_count(), 0);

        let book = registry.book_mut(1);
        assert_eq!(book.product_id(), 1);
        assert!(registry.contains(1));
        assert_eq!(registry.product_count(), 1);

        // Second reference must hand back the same book, not a fresh one.
        registry.book_mut(1);
        assert_eq!(registry.product_count(), 1);
    }

    #[tokio::test]
    async fn test_book_state_survives_reaccess() {
        let store = MockStore::new();
        let mut registry = BookRegistry::new();

        registry
            .book_mut(7)
            .insert(ListingPrice::new(10, 5.0), false, true, &store)
            .await
            .unwrap();

        assert_eq!(registry.book_mut(7).listing_count(), 1);
        assert_eq!(registry.book(7).unwrap().min_price(), 5.0);
    }

    #[tokio::test]
    async fn test_publish_all_snapshots_is_one_batch() {
        let store = MockStore::new();
        let mut registry = BookRegistry::new();

        registry
            .book_mut(1)
            .insert(ListingPrice::new(10, 5.0), false, true, &store)
            .await
            .unwrap();
        registry
            .book_mut(2)
            .insert(ListingPrice::new(20, 9.0), false, true, &store)
            .await
            .unwrap();

        let published = registry.publish_all_snapshots(&store).await.unwrap();
        assert_eq!(published, 2);

        let batches = store.bulk_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);

        // One shared stamp across the whole batch.
        assert_eq!(batches[0][0].published_at, batches[0][1].published_at);
    }

    #[tokio::test]
    async fn test_publish_all_snapshots_empty_registry_writes_nothing() {
        let store = MockStore::new();
        let registry = BookRegistry::new();

        let published = registry.publish_all_snapshots(&store).await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(store.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_all_hits_store_once() {
        let store = MockStore::new();
        let registry = BookRegistry::new();

        registry.invalidate_all_published(&store).await.unwrap();
        assert_eq!(store.invalidate_all_calls(), 1);
    }
}
