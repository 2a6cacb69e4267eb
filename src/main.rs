use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate::cache::MemoryCache;
use paygate::cleanup::RetentionSweeper;
use paygate::config::Config;
use paygate::db::{create_pool, init_db, AppState};
use paygate::handlers;
use paygate::orders::SellerSplitOrders;
use paygate::provider::token::{TokenCache, TokenCacheSettings};
use paygate::provider::QpayClient;
use paygate::rate_limit;
use paygate::reconcile::Reconciler;

#[derive(Parser, Debug)]
#[command(name = "paygate")]
#[command(about = "Webhook-driven payment-confirmation engine")]
struct Cli {
    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.ephemeral && !config.dev_mode {
        tracing::error!("--ephemeral requires PAYGATE_ENV=dev");
        std::process::exit(1);
    }

    if config.internal_api_key.is_empty() {
        tracing::warn!("INTERNAL_API_KEY is not set; internal endpoints are disabled");
    }

    let db = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db.get().expect("Failed to get database connection");
        init_db(&conn).expect("Failed to initialize database schema");
    }

    let cache = Arc::new(MemoryCache::new());
    let provider =
        Arc::new(QpayClient::new(&config).expect("Failed to build provider client"));
    let token_cache = TokenCache::new(
        cache.clone(),
        provider.clone(),
        TokenCacheSettings {
            buffer_secs: config.token_buffer_secs,
            lock_ttl: Duration::from_secs(config.token_lock_ttl_secs),
            retry_attempts: config.token_retry_attempts,
            retry_delay: Duration::from_millis(config.token_retry_delay_ms),
        },
    );

    let state = AppState {
        db,
        cache,
        provider,
        orders: Arc::new(SellerSplitOrders),
        token_cache,
        config: config.clone(),
    };

    tokio::spawn(Reconciler::new(state.clone()).run());
    tokio::spawn(RetentionSweeper::new(state.clone()).run());

    let public = handlers::public_router()
        .layer(rate_limit::standard_layer(config.rate_limit_standard_rpm));
    let health = Router::new()
        .route("/health", axum::routing::get(|| async { "ok" }))
        .layer(rate_limit::relaxed_layer(config.rate_limit_relaxed_rpm));

    let app = Router::new()
        .merge(public)
        .merge(handlers::internal_router())
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    if cli.ephemeral {
        if let Err(e) = std::fs::remove_file(&config.database_path) {
            tracing::warn!("Failed to remove ephemeral database: {}", e);
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
