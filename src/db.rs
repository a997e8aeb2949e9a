use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates the cache and valuation tables when they are missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS company_enrichment_cache (
                cache_key TEXT PRIMARY KEY,
                enriched_data JSONB NOT NULL,
                scraped_page_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS valuations (
                id UUID PRIMARY KEY,
                email TEXT,
                company_name TEXT,
                org_number TEXT,
                industry TEXT,
                value_min NUMERIC(16, 2) NOT NULL DEFAULT 0,
                most_likely NUMERIC(16, 2) NOT NULL DEFAULT 0,
                value_max NUMERIC(16, 2) NOT NULL DEFAULT 0,
                method TEXT,
                input JSONB,
                result JSONB,
                enrichment JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS valuations_draft_lookup \
             ON valuations (lower(email), lower(company_name), updated_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema verified");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
