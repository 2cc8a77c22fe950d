//! Postgres implementation of the price store.
//!
//! Three tables back the engine: `listings` is the source of truth,
//! `listing_changes` is the append-only change stream filled by row triggers
//! on `listings`, and `best_product_prices` holds published aggregates
//! (invalidation is a soft delete, publishes insert fresh rows). The DDL
//! lives in schema.sql at the repository root.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::debug;

use super::PriceStore;
use crate::models::{ChangeRow, ListingRow, PublishedAggregate};

pub struct PgPriceStore {
    pool: PgPool,
}

impl PgPriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    async fn read_current_cursor(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(change_seq), 0) AS cursor FROM listing_changes")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read change stream cursor")?;

        Ok(row.get::<i64, _>("cursor"))
    }

    async fn read_all_active_listings(&self) -> Result<Vec<ListingRow>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, listing_id, price
            FROM listings
            WHERE is_deleted = 0 AND is_active = 1
            ORDER BY product_id ASC, price ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to read active listings")?;

        let listings = rows
            .iter()
            .map(|row| ListingRow {
                product_id: row.get("product_id"),
                listing_id: row.get("listing_id"),
                price: row.get("price"),
            })
            .collect();

        Ok(listings)
    }

    async fn read_changes_since(&self, cursor: i64) -> Result<Vec<ChangeRow>> {
        // Net semantics: only the latest change per listing matters. A
        // collapsed history replays cleanly because an insert lands as
        // insert-or-replace and deleting an absent listing is a no-op.
        let rows = sqlx::query(
            r#"
            SELECT product_id, listing_id, price, is_active, is_deleted, operation
            FROM (
                SELECT DISTINCT ON (listing_id)
                    product_id, listing_id, price, is_active, is_deleted, operation
                FROM listing_changes
                WHERE change_seq > $1
                ORDER BY listing_id, change_seq DESC
            ) latest
            ORDER BY product_id ASC, price ASC
            "#,
        )
        .bind(cursor)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read change rows")?;

        let changes = rows
            .iter()
            .map(|row| ChangeRow {
                product_id: row.get("product_id"),
                listing_id: row.get("listing_id"),
                price: row.get("price"),
                is_active: row.get("is_active"),
                is_deleted: row.get("is_deleted"),
                operation: row.get("operation"),
            })
            .collect();

        Ok(changes)
    }

    async fn invalidate_all_published(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE best_product_prices SET is_deleted = TRUE WHERE is_deleted = FALSE")
                .execute(&self.pool)
                .await
                .context("Failed to invalidate published aggregates")?;

        Ok(result.rows_affected())
    }

    async fn invalidate_published_for_product(&self, product_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE best_product_prices
            SET is_deleted = TRUE
            WHERE product_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(product_id)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to invalidate published aggregate for product {}",
                product_id
            )
        })?;

        Ok(result.rows_affected())
    }

    async fn bulk_publish_aggregates(&self, rows: &[PublishedAggregate]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        // One INSERT over parallel arrays, one round trip for the whole batch.
        let product_ids: Vec<i64> = rows.iter().map(|r| r.product_id).collect();
        let price_mins: Vec<f64> = rows.iter().map(|r| r.price_min).collect();
        let price_maxes: Vec<f64> = rows.iter().map(|r| r.price_max).collect();
        let listing_counts: Vec<i64> = rows.iter().map(|r| r.listing_count).collect();
        let published_ats: Vec<DateTime<Utc>> = rows.iter().map(|r| r.published_at).collect();

        sqlx::query(
            r#"
            INSERT INTO best_product_prices
                (product_id, price_min, price_max, listing_count, published_at, is_deleted)
            SELECT product_id, price_min, price_max, listing_count, published_at, FALSE
            FROM UNNEST($1::bigint[], $2::float8[], $3::float8[], $4::bigint[], $5::timestamptz[])
                AS t(product_id, price_min, price_max, listing_count, published_at)
            "#,
        )
        .bind(&product_ids)
        .bind(&price_mins)
        .bind(&price_maxes)
        .bind(&listing_counts)
        .bind(&published_ats)
        .execute(&self.pool)
        .await
        .context("Failed to bulk publish aggregates")?;

        debug!("Bulk published {} aggregate rows", rows.len());
        Ok(())
    }

    async fn publish_aggregate(&self, row: &PublishedAggregate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO best_product_prices
                (product_id, price_min, price_max, listing_count, published_at, is_deleted)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            "#,
        )
        .bind(row.product_id)
        .bind(row.price_min)
        .bind(row.price_max)
        .bind(row.listing_count)
        .bind(row.published_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to publish aggregate for product {}", row.product_id))?;

        Ok(result.rows_affected())
    }
}
