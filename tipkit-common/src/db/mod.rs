//! Database access for TipKit
//!
//! PostgreSQL via sqlx. The schema is created idempotently at pool
//! initialization; readers stay consistent because every multi-row mutation
//! in [`store`] runs inside a transaction.

pub mod memory;
pub mod models;
pub mod retry;
pub mod store;

pub use memory::MemoryTipStore;
pub use models::{
    Embedding, Location, NewPromotion, ProcessedTip, Promotion, Tip, TipStatus,
};
pub use store::{PgTipStore, TipStore};

use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to PostgreSQL and ensure the schema exists.
pub async fn init_database_pool(database_url: &str) -> Result<PgPool> {
    tracing::debug!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS locations (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT NOT NULL,
            latitude DOUBLE PRECISION,
            longitude DOUBLE PRECISION,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_locations_name_country
            ON locations (lower(btrim(name)), lower(btrim(country)))
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tips (
            id BIGSERIAL PRIMARY KEY,
            raw_text TEXT NOT NULL,
            detected_language TEXT,
            translated_text TEXT,
            location_id BIGINT NOT NULL REFERENCES locations(id),
            submitted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            processed_at TIMESTAMPTZ,
            status TEXT NOT NULL DEFAULT 'pending',
            failure_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tips_status ON tips (status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tips_location ON tips (location_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id BIGSERIAL PRIMARY KEY,
            tip_id BIGINT NOT NULL UNIQUE REFERENCES tips(id) ON DELETE CASCADE,
            vector REAL[] NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS promotions (
            id BIGSERIAL PRIMARY KEY,
            location_id BIGINT NOT NULL REFERENCES locations(id),
            tip_text TEXT NOT NULL,
            mention_count BIGINT NOT NULL,
            similarity_score DOUBLE PRECISION NOT NULL,
            promoted_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_promotions_location_mentions
            ON promotions (location_id, mention_count DESC)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema initialized (locations, tips, embeddings, promotions)");

    Ok(())
}
