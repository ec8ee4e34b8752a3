mod api;
mod auth;
mod config;
mod cors;
mod db;
mod error;
mod live;
mod store;
mod sync;
mod validation;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    api::AppState,
    auth::{grant::RoomGrantIssuer, jwt::JwtAccessTokenService},
    config::{LogFormat, ServerConfig},
    db::{
        migrations::run_migrations,
        pool::{check_pool_health, create_pg_pool, PoolConfig},
    },
    error::{attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope},
    live::LiveStore,
    store::CanonicalStore,
    sync::{scheduler::start_periodic_sweeper, webhook::WebhookVerifier},
    validation::MAX_REST_BODY_BYTES,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(&config);

    if config.is_dev_jwt_secret() {
        warn!("using the development JWT secret; set ROOMSYNC_JWT_SECRET in production");
    }

    let jwt_service = Arc::new(
        JwtAccessTokenService::new(&config.jwt_secret).context("invalid roomsync JWT secret")?,
    );
    let grants =
        Arc::new(RoomGrantIssuer::new(&config.jwt_secret).context("invalid room grant secret")?);
    let webhook = match config.webhook_secret.as_deref() {
        Some(secret) => Some(Arc::new(
            WebhookVerifier::new(secret).context("invalid ROOMSYNC_WEBHOOK_SECRET")?,
        )),
        None => {
            warn!("ROOMSYNC_WEBHOOK_SECRET is not set; storage webhooks will be rejected");
            None
        }
    };

    let database_url =
        config.database_url.as_deref().context("ROOMSYNC_DATABASE_URL must be set")?;
    let pool = create_pg_pool(database_url, PoolConfig::from_env())
        .await
        .context("failed to create relational store pool")?;
    check_pool_health(&pool).await.context("relational store health check failed")?;
    run_migrations(&pool).await.context("failed to run relational store migrations")?;
    let store = CanonicalStore::Postgres(pool);

    let live = LiveStore::from_config(&config.live).context("invalid live store configuration")?;
    info!(backend = live.backend_name(), "live store configured");

    let sweeper = config.sweep_interval.map(|interval| {
        start_periodic_sweeper(live.clone(), store.clone(), interval, config.delete_concurrency)
    });

    let state = AppState {
        live,
        store,
        grants,
        webhook,
        delete_concurrency: config.delete_concurrency,
    };
    let app = build_app(api::router(state, jwt_service), config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting roomsync server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("roomsync server exited unexpectedly");

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    served
}

fn init_tracing(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_app(api_router: Router, cors_origins: Option<&str>) -> Router {
    apply_middleware(Router::new().route("/healthz", get(healthz)).merge(api_router))
        .layer(cors::cors_layer(cors_origins))
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
