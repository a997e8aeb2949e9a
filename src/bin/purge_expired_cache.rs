//! Script to purge expired enrichment cache rows from the database.

use company_valuation_api::config::Config;
use company_valuation_api::db::Database;
use company_valuation_api::enrichment_cache::PgEnrichmentCache;

/// Main entry point for the purge script.
///
/// Deletes `company_enrichment_cache` rows whose `expires_at` has passed.
/// Reads never serve them anyway; this only reclaims space.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let database_url = config
        .database_url
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let db = Database::new(&database_url).await?;
    db.ensure_schema().await?;
    tracing::info!("Connected to database. Purging expired enrichment cache entries...");

    let cache = PgEnrichmentCache::new(db.pool.clone());
    let removed = cache
        .purge_expired()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!("Purge complete. Deleted {} expired entries.", removed);
    db.close().await;

    Ok(())
}
