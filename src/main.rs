use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seat_reservation::{
    app,
    cache::SeatMapCache,
    clock::SystemClock,
    config::{Config, LogFormat},
    database::Database,
    notify::{AuditSink, LogNotifier, Notifier, PgAuditSink, SideChannel, SideChannelWorker, WebhookNotifier},
    redis_client::RedisClient,
    store::PgReservationStore,
    AppState,
};

const SIDE_CHANNEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::new(&config.app.rust_log);
    match config.app.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Plain => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!(environment = %config.app.environment, "Starting seat reservation service");

    // Connect to the database
    let db = Database::connect(&config.database.url, config.database.pool_size)
        .await
        .context("failed to connect to database")?;
    info!("Database connected");

    db.run_migrations().await.context("failed to run migrations")?;

    // Redis is optional: without it the seat map is always read from Postgres
    let cache = match &config.redis.url {
        Some(url) => match RedisClient::connect(url).await {
            Ok(redis) => {
                info!("Redis connected");
                Some(SeatMapCache::new(redis))
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, seat map cache disabled");
                None
            }
        },
        None => None,
    };

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), &config.circuit_breaker)
                .context("failed to build webhook client")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let audit: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(db.clone()));

    let (side_channel, notices) = SideChannel::new();
    let side_channel_worker = tokio::spawn(SideChannelWorker::new(notices, cache.clone(), notifier, audit).run());

    let store = Arc::new(PgReservationStore::new(db.clone()));
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        cache,
        side_channel,
    ));

    // --- Optional in-process sweeper ---
    let sweeper_task = config.sweeper.interval_secs.filter(|s| *s > 0).map(|secs| {
        let sweeper_state = state.clone();
        info!("In-process sweeper running every {}s", secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                ticker.tick().await;
                sweeper_state.sweeper.run_once().await;
            }
        })
    });

    // --- Start the web server ---
    let router = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("HOST/PORT do not form a valid socket address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its AppState) is gone once serve returns. Stopping the
    // sweeper drops the last SideChannel, which lets the worker drain and exit.
    if let Some(task) = sweeper_task {
        task.abort();
        let _ = task.await;
    }
    match tokio::time::timeout(SIDE_CHANNEL_DRAIN_TIMEOUT, side_channel_worker).await {
        Ok(Ok(())) => info!("Side channel drained"),
        Ok(Err(e)) => warn!(error = %e, "side channel worker failed"),
        Err(_) => warn!("side channel did not drain in time, pending notices dropped"),
    }

    db.close().await;
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
