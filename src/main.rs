use anyhow::Context;
use clap::Parser;
use histmap::{
    api::routes::build_app,
    cli::{Cli, Commands},
    db::DatabaseProvider,
    utils::{
        clock::{Clock, SystemClock},
        config::{init_tracing, HistmapConfig},
    },
    AppState, SessionStore,
};
use std::sync::Arc;

const SECS_PER_DAY: i64 = 86_400;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets usually come from .env during development
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = HistmapConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_tracing(&config.server, cli.verbose);

    let provider = DatabaseProvider::from_config(&config.database);
    tracing::info!(url = %config.database.url, "Opening database");
    let store: Arc<dyn SessionStore> = provider
        .create_client()
        .await
        .context("opening database")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.resolved_command() {
        Commands::Serve => serve(config, store, clock).await,
        Commands::PurgeSessions {
            anonymous_older_than_days,
        } => purge_sessions(store, clock, anonymous_older_than_days).await,
    }
}

async fn serve(
    config: HistmapConfig,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<()> {
    let jwt_secret = config.jwt_secret().context("resolving JWT secret")?;
    let addr = config.bind_address();

    let state = AppState::new(config, store, clock, jwt_secret);
    let background = state.spawn_background_tasks();
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("histmap-server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("HTTP server stopped, waiting for background tasks");
    background.shutdown().await;

    Ok(())
}

async fn purge_sessions(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    anonymous_older_than_days: Option<u32>,
) -> anyhow::Result<()> {
    let now = clock.now_secs();

    let purged = store.purge_expired_sessions(now).await?;
    println!("Removed {} expired or ended sessions", purged);

    if let Some(days) = anonymous_older_than_days {
        let before = now - i64::from(days) * SECS_PER_DAY;
        let purged = store.purge_anonymous_sessions(before).await?;
        println!(
            "Removed {} anonymous sessions idle for more than {} days",
            purged, days
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to set up SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
