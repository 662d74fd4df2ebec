/// Media Service - HTTP Server
///
/// Handles video uploads, background ingestion and live progress.
use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use media_service::cache::{CachedVideoStore, MediaCache};
use media_service::db::{PgVideoStore, VideoStore, MIGRATOR};
use media_service::handlers;
use media_service::logging::init_tracing;
use media_service::metrics::serve_metrics;
use media_service::middleware::JwtVerifier;
use media_service::services::storage::{s3::get_s3_client, AssetStore, S3AssetStore};
use media_service::services::transcoder::{FfmpegToolkit, MediaToolkit};
use media_service::services::{
    IngestOrchestrator, IngestSettings, PresenceRegistry, ProgressRelay,
};
use media_service::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    let http_bind_address = format!("{}:{}", config.app.host, config.app.port);

    tracing::info!(env = %config.app.env, %http_bind_address, "media-service starting");

    for dir in [&config.ingest.upload_dir, &config.ingest.work_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    MIGRATOR
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    let pg_store: Arc<dyn VideoStore> = Arc::new(PgVideoStore::new(db_pool));
    let store: Arc<dyn VideoStore> = match &config.cache.redis_url {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url.as_str()).context("Invalid REDIS_URL")?;
            let cache = MediaCache::new(client, Some(config.cache.ttl_seconds))
                .await
                .context("Failed to initialize cache")?;
            tracing::info!("redis video cache enabled");
            Arc::new(CachedVideoStore::new(pg_store, cache))
        }
        None => pg_store,
    };

    let s3_client = get_s3_client(&config.s3).await;
    let assets: Arc<dyn AssetStore> = Arc::new(S3AssetStore::new(s3_client, &config.s3));
    let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::from_config(&config.transcode));

    let relay = ProgressRelay::new();
    let presence = PresenceRegistry::new();
    let settings = IngestSettings::from_config(&config);
    if let Some(limit) = settings.max_concurrent_transcodes {
        tracing::info!(limit, "transcode admission gate enabled");
    }
    let orchestrator = IngestOrchestrator::new(
        store.clone(),
        toolkit,
        assets.clone(),
        relay.clone(),
        settings,
    );

    let verifier = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));
    let ingest_config = config.ingest.clone();

    HttpServer::new(move || {
        let verifier = verifier.clone();
        App::new()
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(assets.clone()))
            .app_data(web::Data::new(orchestrator.clone()))
            .app_data(web::Data::new(relay.clone()))
            .app_data(web::Data::new(presence.clone()))
            .app_data(web::Data::new(ingest_config.clone()))
            .app_data(web::Data::from(verifier.clone()))
            .wrap(actix_middleware::Logger::default())
            .route(
                "/api/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route(
                "/api/v1/health/ready",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/health/live",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/openapi.json",
                web::get().to(|| async {
                    use utoipa::OpenApi;
                    HttpResponse::Ok()
                        .content_type("application/json")
                        .json(media_service::openapi::ApiDoc::openapi())
                }),
            )
            .route("/metrics", web::get().to(serve_metrics))
            .configure(|cfg| handlers::configure(cfg, verifier))
    })
    .bind(&http_bind_address)
    .with_context(|| format!("Failed to bind {http_bind_address}"))?
    .run()
    .await
    .context("HTTP server error")?;

    tracing::info!("media-service shutting down");
    Ok(())
}
