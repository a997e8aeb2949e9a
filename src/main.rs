use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use company_valuation_api::config::Config;
use company_valuation_api::db::Database;
use company_valuation_api::enrichment::EnrichmentOrchestrator;
use company_valuation_api::enrichment_cache::{
    EnrichmentCache, MemoryEnrichmentCache, PgEnrichmentCache,
};
use company_valuation_api::handlers::{self, AppState};
use company_valuation_api::llm_client::{OpenAiChatClient, TextGenerator};
use company_valuation_api::rate_limit::RateLimiters;
use company_valuation_api::sources::default_adapters;
use company_valuation_api::valuation_service::ValuationService;
use company_valuation_api::valuation_store::{
    MemoryValuationStore, PgValuationStore, ValuationStore,
};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection and schema (optional).
/// - Enrichment cache, valuation store and source adapters.
/// - HTTP routes and middleware (CORS, body limit, rate limiting).
///
/// It then serves until Ctrl-C or SIGTERM and closes the database pool.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "company_valuation_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Database is optional; without it both stores live in memory
    let db = match config.database_url {
        Some(ref url) => {
            let db = Database::new(url).await?;
            db.ensure_schema().await?;
            tracing::info!("Database connection pool established");
            Some(db)
        }
        None => None,
    };

    let (cache, store): (Arc<dyn EnrichmentCache>, Arc<dyn ValuationStore>) = match db {
        Some(ref db) => (
            Arc::new(PgEnrichmentCache::new(db.pool.clone())),
            Arc::new(PgValuationStore::new(db.pool.clone())),
        ),
        None => (
            Arc::new(MemoryEnrichmentCache::default()),
            Arc::new(MemoryValuationStore::new()),
        ),
    };

    let generator: Option<Arc<dyn TextGenerator>> = OpenAiChatClient::from_config(&config)
        .map(|client| {
            tracing::info!("✓ Generation client initialized: {}", config.openai_model);
            Arc::new(client) as Arc<dyn TextGenerator>
        });

    let adapters = default_adapters(&config, generator.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build source adapters: {}", e))?;
    tracing::info!("{} source adapters ready", adapters.len());

    let enrichment = Arc::new(EnrichmentOrchestrator::new(
        adapters,
        cache,
        Duration::from_secs(config.source_timeout_secs),
    ));
    let valuation = Arc::new(ValuationService::new(
        generator,
        store,
        Some(enrichment.clone()),
        config.bands,
    ));

    let rate_limiters = Arc::new(RateLimiters::new(
        config.enrichment_rate_per_minute,
        config.valuation_rate_per_minute,
    ));

    // Forget callers whose quota has refilled
    let housekeeping = rate_limiters.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            housekeeping.retain_recent();
        }
    });

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        enrichment,
        valuation,
        rate_limiters,
    });

    // Flood protection: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(db) = db {
        db.close().await;
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
