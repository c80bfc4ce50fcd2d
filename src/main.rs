use axum::Router;
use blogpulse::analytics::store::SqliteAnalyticsStore;
use blogpulse::analytics::AnalyticsState;
use blogpulse::auth::session;
use blogpulse::cache::{sweep, ResponseCache};
use blogpulse::clock::{Clock, SystemClock};
use blogpulse::config::AppConfig;
use blogpulse::{error, routes, storage};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "blogpulse", about = "Blog analytics and settings backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create or promote an admin user and print a session token for it
    CreateAdmin {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blogpulse=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(Some(&cli.config))?;

    if let Err(msg) = config.validate() {
        eprintln!("Configuration error: {msg}");
        return Err(msg.into());
    }

    // Setup SQLite pool
    let pool = storage::sqlite::create_pool(&config.database)?;
    storage::sqlite::init_pool(&pool).await?;
    tracing::info!(db = %config.database.path.display(), "database initialized");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, pool).await,
        Command::CreateAdmin { email } => {
            let clock = SystemClock;
            let user_id = session::upsert_user(&pool, &clock, &email, true).await?;
            let token =
                session::create_session(&pool, &clock, &user_id, config.auth.session_ttl_secs)
                    .await?;
            tracing::info!(user_id = %user_id, "admin session created");
            println!("{}={token}", session::SESSION_COOKIE);
            Ok(())
        }
    }
}

async fn serve(
    config: AppConfig,
    pool: deadpool_sqlite::Pool,
) -> Result<(), Box<dyn std::error::Error>> {
    error::set_expose_internal_errors(config.server.dev_mode);
    if config.server.dev_mode {
        tracing::warn!("dev_mode enabled: internal error details are sent to clients");
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        cache_ttl_secs = config.analytics.cache_ttl_secs,
        utc_offset_minutes = config.analytics.utc_offset_minutes,
        "starting blogpulse"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(ResponseCache::new(
        config.analytics.cache_capacity,
        clock.clone(),
    ));
    let store = Arc::new(SqliteAnalyticsStore::new(pool.clone()));
    let state = Arc::new(AnalyticsState::new(
        store,
        cache.clone(),
        clock.clone(),
        config.analytics.clone(),
    )?);

    // Background tasks stop when this token is cancelled
    let shutdown = CancellationToken::new();
    let sweeper_handle = sweep::spawn_sweeper(
        cache,
        Duration::from_secs(config.analytics.sweep_interval_secs),
        shutdown.clone(),
    );
    let cleanup_pool = pool.clone();
    let cleanup_token = shutdown.clone();
    let cleanup_handle = tokio::spawn(async move {
        session::session_cleanup_loop(cleanup_pool, clock, cleanup_token).await;
    });

    // Rate limiter for the public tracking beacon
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(config.rate_limit.per_second)
        .burst_size(config.rate_limit.burst_size)
        .finish()
        .ok_or("failed to build rate limiter config")?;

    let tracking = routes::tracking_routes(state.clone()).layer(GovernorLayer::new(governor_conf));
    let app: Router = routes::api_routes(state, pool)
        .merge(tracking)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(
        shutdown,
        vec![sweeper_handle, cleanup_handle],
    ))
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken, tasks: Vec<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down...");
    shutdown.cancel();

    for task in tasks {
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }
}
