//! Persistence gateway
//!
//! The transactional interface the coordinator and promotion engine run
//! against. [`PgTipStore`] is the production implementation;
//! [`crate::db::MemoryTipStore`] backs tests that don't want a server.

use crate::db::models::{Embedding, Location, NewPromotion, ProcessedTip, Promotion, Tip};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// Transactional gateway over tips, embeddings, and promotions.
///
/// Implementations must keep every multi-row mutation atomic: a reader never
/// observes a half-applied result or a partially replaced promotion set.
#[async_trait]
pub trait TipStore: Send + Sync {
    /// Look up a location by `(name, country)` (case-insensitive, trimmed),
    /// creating it on first reference.
    async fn find_or_create_location(&self, name: &str, country: &str) -> Result<Location>;

    /// Insert a raw tip as `pending`. Ingestion-boundary contract; the core
    /// uses it for seeding and tests.
    async fn insert_tip(&self, location_id: i64, raw_text: &str) -> Result<Tip>;

    /// Atomically claim up to `limit` pending tips, transitioning them to
    /// `processing`. Returns them ordered by `submitted_at` ascending.
    /// Concurrent claimants receive disjoint sets (skip-locked semantics).
    async fn claim_pending(&self, limit: i64) -> Result<Vec<Tip>>;

    /// Record a successful processing result in one transaction: upsert the
    /// embedding, store language and translation, mark `processed`.
    /// Idempotent by `tip_id`; an embedding uniqueness conflict is success.
    async fn record_result(
        &self,
        tip_id: i64,
        detected_language: &str,
        translated_text: &str,
        vector: &[f32],
    ) -> Result<()>;

    /// Mark a tip `failed` with an opaque short reason.
    async fn record_failure(&self, tip_id: i64, reason: &str) -> Result<()>;

    /// Compensation: return still-`processing` tips to `pending`. Tips that
    /// already reached a terminal state are left untouched.
    async fn release_claimed(&self, tip_ids: &[i64]) -> Result<()>;

    /// All processed tips of a location with their embeddings, in stable
    /// `tip_id` order.
    async fn list_processed(&self, location_id: i64) -> Result<Vec<ProcessedTip>>;

    /// Replace the location's promotion set in one transaction.
    async fn replace_promotions(
        &self,
        location_id: i64,
        promotions: &[NewPromotion],
    ) -> Result<()>;

    /// Current promotions of a location, ranked.
    async fn promotions_for(&self, location_id: i64) -> Result<Vec<Promotion>>;

    /// Fetch a single tip.
    async fn tip(&self, tip_id: i64) -> Result<Tip>;

    /// The tip's stored embedding, if one exists. At most one per tip.
    async fn embedding_for(&self, tip_id: i64) -> Result<Option<Embedding>>;
}

/// PostgreSQL-backed gateway.
#[derive(Clone)]
pub struct PgTipStore {
    pool: PgPool,
}

impl PgTipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TipStore for PgTipStore {
    async fn find_or_create_location(&self, name: &str, country: &str) -> Result<Location> {
        let existing = sqlx::query_as::<_, Location>(
            r#"
            SELECT * FROM locations
            WHERE lower(btrim(name)) = lower(btrim($1))
              AND lower(btrim(country)) = lower(btrim($2))
            "#,
        )
        .bind(name)
        .bind(country)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(location) = existing {
            return Ok(location);
        }

        // Insert racing against another creator is resolved by the unique
        // index; losing the race falls through to the re-select.
        sqlx::query(
            r#"
            INSERT INTO locations (name, country) VALUES (btrim($1), btrim($2))
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(name)
        .bind(country)
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Location>(
            r#"
            SELECT * FROM locations
            WHERE lower(btrim(name)) = lower(btrim($1))
              AND lower(btrim(country)) = lower(btrim($2))
            "#,
        )
        .bind(name)
        .bind(country)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn insert_tip(&self, location_id: i64, raw_text: &str) -> Result<Tip> {
        if raw_text.trim().is_empty() {
            return Err(Error::InvalidInput("tip text must not be empty".to_string()));
        }

        sqlx::query_as::<_, Tip>(
            "INSERT INTO tips (raw_text, location_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(raw_text)
        .bind(location_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<Tip>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut claimed = sqlx::query_as::<_, Tip>(
            r#"
            UPDATE tips SET status = 'processing'
            WHERE id IN (
                SELECT id FROM tips
                WHERE status = 'pending'
                ORDER BY submitted_at ASC, id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not guarantee row order
        claimed.sort_by(|a, b| (a.submitted_at, a.id).cmp(&(b.submitted_at, b.id)));
        Ok(claimed)
    }

    async fn record_result(
        &self,
        tip_id: i64,
        detected_language: &str,
        translated_text: &str,
        vector: &[f32],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Embeddings are immutable: a second write for the same tip is a
        // no-op, which makes the whole operation idempotent.
        sqlx::query(
            r#"
            INSERT INTO embeddings (tip_id, vector) VALUES ($1, $2)
            ON CONFLICT (tip_id) DO NOTHING
            "#,
        )
        .bind(tip_id)
        .bind(vector.to_vec())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE tips
            SET detected_language = $2,
                translated_text = $3,
                status = 'processed',
                processed_at = now(),
                failure_reason = NULL
            WHERE id = $1
            "#,
        )
        .bind(tip_id)
        .bind(detected_language)
        .bind(translated_text)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(&self, tip_id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tips
            SET status = 'failed', processed_at = now(), failure_reason = $2
            WHERE id = $1
            "#,
        )
        .bind(tip_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_claimed(&self, tip_ids: &[i64]) -> Result<()> {
        if tip_ids.is_empty() {
            return Ok(());
        }

        let released = sqlx::query(
            r#"
            UPDATE tips SET status = 'pending'
            WHERE id = ANY($1) AND status = 'processing'
            "#,
        )
        .bind(tip_ids.to_vec())
        .execute(&self.pool)
        .await?;

        if released.rows_affected() > 0 {
            tracing::info!(
                released = released.rows_affected(),
                "Returned claimed tips to pending"
            );
        }
        Ok(())
    }

    async fn list_processed(&self, location_id: i64) -> Result<Vec<ProcessedTip>> {
        sqlx::query_as::<_, ProcessedTip>(
            r#"
            SELECT t.id AS tip_id, t.translated_text, e.vector
            FROM tips t
            JOIN embeddings e ON e.tip_id = t.id
            WHERE t.location_id = $1
              AND t.status = 'processed'
              AND t.translated_text IS NOT NULL
            ORDER BY t.id ASC
            "#,
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn replace_promotions(
        &self,
        location_id: i64,
        promotions: &[NewPromotion],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM promotions WHERE location_id = $1")
            .bind(location_id)
            .execute(&mut *tx)
            .await?;

        for promotion in promotions {
            sqlx::query(
                r#"
                INSERT INTO promotions (location_id, tip_text, mention_count, similarity_score)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(location_id)
            .bind(&promotion.tip_text)
            .bind(promotion.mention_count)
            .bind(promotion.similarity_score)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn promotions_for(&self, location_id: i64) -> Result<Vec<Promotion>> {
        sqlx::query_as::<_, Promotion>(
            r#"
            SELECT * FROM promotions
            WHERE location_id = $1
            ORDER BY mention_count DESC, similarity_score DESC, id ASC
            "#,
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn tip(&self, tip_id: i64) -> Result<Tip> {
        sqlx::query_as::<_, Tip>("SELECT * FROM tips WHERE id = $1")
            .bind(tip_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tip {tip_id}")))
    }

    async fn embedding_for(&self, tip_id: i64) -> Result<Option<Embedding>> {
        sqlx::query_as::<_, Embedding>("SELECT * FROM embeddings WHERE tip_id = $1")
            .bind(tip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)
    }
}
