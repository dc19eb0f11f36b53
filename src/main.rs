//! Changelog - aggregates conventional commits pushed by CI pipelines and
//! serves them back through a searchable, paginated API.
//!
//! # Usage
//! ```bash
//! changelog --secret s3cr3t                              # In-process store and cache
//! changelog --database-url postgres://.. --redis-url redis://..
//! changelog --database-url postgres://.. refresh         # One-shot lexeme refresh
//! ```

mod cache;
mod error;
mod models;
mod routes;
mod scheduler;
mod service;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::Router;
use axum::http::StatusCode;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache::{CacheBackend, MemoryCache, RedisCache};
use routes::AppState;
use scheduler::RefreshSchedule;
use service::Changelog;
use store::{CommitStore, MemoryStore, PgStore};

/// Changelog - search the commits of all your repositories
#[derive(Parser)]
#[command(name = "changelog")]
#[command(about = "Conventional commits aggregator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port to run the server on
    #[arg(short, long, env = "PORT", default_value = "1080")]
    port: u16,

    /// Postgres connection string; commits are kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum size of the Postgres connection pool
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "5")]
    max_connections: u32,

    /// Redis connection string; searches are cached in memory when absent
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Secret expected in the Authorization header of write requests
    #[arg(long, env = "HTTP_SECRET", default_value = "", hide_env_values = true)]
    secret: String,

    /// Upper bound on the handling time of a request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    request_timeout_secs: u64,

    /// Local time of the daily lexeme refresh (HH:MM)
    #[arg(long, env = "REFRESH_AT", default_value = "06:00")]
    refresh_at: String,

    /// Timezone of the daily lexeme refresh
    #[arg(long, env = "REFRESH_TIMEZONE", default_value = "Europe/Paris")]
    refresh_timezone: String,

    /// Disable the daily lexeme refresh
    #[arg(long)]
    no_refresh_schedule: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh lexeme and filter indexes once, then exit
    Refresh,
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn CommitStore>> {
    let Some(url) = cli.database_url.as_deref() else {
        tracing::warn!("no database configured, commits are kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let store = PgStore::connect(url, cli.max_connections)
        .await
        .context("unable to connect to database")?;
    store.migrate().await.context("unable to migrate database")?;

    Ok(Arc::new(store))
}

async fn open_cache(cli: &Cli) -> anyhow::Result<Arc<dyn CacheBackend>> {
    let Some(url) = cli.redis_url.as_deref() else {
        tracing::info!("no redis configured, searches are cached in memory");
        return Ok(Arc::new(MemoryCache::new()));
    };

    let cache = RedisCache::connect(url)
        .await
        .context("unable to connect to redis")?;

    Ok(Arc::new(cache))
}

/// Standalone refresh, meant to be run by an external job scheduler.
async fn refresh_once(cli: &Cli) -> anyhow::Result<()> {
    let Some(url) = cli.database_url.as_deref() else {
        bail!("refresh requires a database (--database-url or DATABASE_URL)");
    };

    let store = PgStore::connect(url, 1)
        .await
        .context("unable to connect to database")?;
    let result = store.refresh().await;
    store.close().await;

    result.context("refresh failed")?;
    tracing::info!("lexeme and filter indexes refreshed");
    Ok(())
}

/// Wraps the API with request timeout, CORS and tracing.
fn with_layers(router: Router, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(router)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(Commands::Refresh) = cli.command {
        return refresh_once(&cli).await;
    }

    let secret = cli.secret.trim().to_string();
    if secret.is_empty() {
        bail!("a non-blank secret is required (--secret or HTTP_SECRET)");
    }

    let schedule = RefreshSchedule::parse(&cli.refresh_at, &cli.refresh_timezone)?;

    let store = open_store(&cli).await?;
    let cache = open_cache(&cli).await?;
    let changelog = Changelog::new(store, cache);

    if cli.no_refresh_schedule {
        tracing::info!("daily lexeme refresh disabled");
    } else {
        scheduler::spawn(changelog.clone(), schedule);
    }

    let state = Arc::new(AppState { changelog, secret });

    let app = with_layers(
        routes::create_router(state),
        Duration::from_secs(cli.request_timeout_secs),
    );

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to bind to port {}", cli.port))?;

    tracing::info!(addr = %addr, "changelog listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "unable to listen for shutdown signal");
        }
        tracing::info!("shutting down");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
