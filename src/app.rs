use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::{AppConfig, BackendConfig, CorsConfig, load_s3_client},
    database,
    error::{AppError, Result},
    routes::{self, products::REVISION_HEADER},
    services::{
        CatalogService, CatalogStore, ImageStore, MemoryCatalogStore, MemoryImageStore,
        PgCatalogStore, S3ImageStore,
    },
};

const MEMORY_IMAGE_BASE: &str = "memory://images";

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

pub async fn build(config: &AppConfig) -> Result<Router> {
    let state = build_state(config).await?;

    router(state, config)
}

/// Connects the configured backend and starts the image cleanup worker.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let (store, images): (Arc<dyn CatalogStore>, Arc<dyn ImageStore>) = match &config.backend {
        BackendConfig::Remote { database, s3 } => {
            let pool = database::create_pool(database).await?;
            let client = load_s3_client(s3).await;

            tracing::info!(
                "Using collection {} with images in bucket {}",
                config.catalog.collection,
                s3.bucket
            );

            (
                Arc::new(PgCatalogStore::new(pool, config.catalog.collection.clone())),
                Arc::new(S3ImageStore::new(
                    client,
                    s3.bucket.clone(),
                    config.catalog.image_url_ttl_secs,
                )),
            )
        }
        BackendConfig::Memory => {
            tracing::warn!("Using in-memory catalog; data is lost on restart");

            (
                Arc::new(MemoryCatalogStore::new()),
                Arc::new(MemoryImageStore::new(MEMORY_IMAGE_BASE)),
            )
        }
    };

    let catalog = Arc::new(CatalogService::new(store, images, &config.catalog));
    let cleanup_every = Duration::from_secs(config.catalog.cleanup_interval_secs);
    let _cleanup_worker = catalog.spawn_cleanup_worker(cleanup_every);

    Ok(AppState { catalog })
}

pub fn router(state: AppState, config: &AppConfig) -> Result<Router> {
    let cors = cors_layer(&config.cors)?;

    Ok(routes::create_router()
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let allowed_origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|_| AppError::ConfigError(format!("Invalid CORS origin: {}", origin)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([HeaderName::from_static(REVISION_HEADER)])
        .allow_origin(allowed_origins))
}
