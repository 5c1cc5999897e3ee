use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use chirp_service::config::{Config, StoreBackend};
use chirp_service::db::{ContentStore, MemoryContentStore, PgContentStore, MIGRATOR};
use chirp_service::handlers::{self, AppState};
use chirp_service::jobs::ScheduledPublisher;
use crypto_core::jwt::TokenIssuer;
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Open the configured content store, running migrations for PostgreSQL
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ContentStore>> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory content store; data is lost on restart");
            Ok(Arc::new(MemoryContentStore::new()))
        }
        StoreBackend::Postgres => {
            let mut db_cfg = DbPoolConfig::from_env("chirp-service", &config.database.url);
            if std::env::var("DB_MAX_CONNECTIONS").is_err() {
                db_cfg.max_connections = config.database.max_connections;
            }
            db_cfg.log_config();

            let pool = create_pg_pool(db_cfg)
                .await
                .context("failed to connect to PostgreSQL")?;
            MIGRATOR
                .run(&pool)
                .await
                .context("failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            Ok(Arc::new(PgContentStore::new(pool)))
        }
    }
}

/// Chirp Service
///
/// Serves the JSON API for a small Twitter-style network and runs the
/// scheduled post publisher alongside it.
///
/// # Routes
///
/// - `/api/v1/feed` - merged timeline with trending sidebar
/// - `/api/v1/tweet`, `/retweet/{id}`, `/quote/{id}` - posting
/// - `/api/v1/create_poll`, `/vote_poll/{id}` - polls
/// - `/api/v1/follow/{username}`, `/profile/{username}` - social graph
/// - `/api/v1/messages`, `/notifications` - inbox
/// - `/api/v1/health*`, `/metrics` - probes and Prometheus
#[actix_web::main]
async fn main() -> io::Result<()> {
    // Support container healthchecks via CLI subcommand
    {
        let mut args = std::env::args();
        let _bin = args.next();
        if let Some(cmd) = args.next() {
            if cmd == "healthcheck" || cmd == "healthcheck-http" {
                let port = std::env::var("CHIRP_PORT").unwrap_or_else(|_| "8080".to_string());
                let url = format!("http://127.0.0.1:{}/api/v1/health", port);
                match reqwest::Client::new().get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => return Ok(()),
                    Ok(resp) => {
                        eprintln!("healthcheck HTTP status: {}", resp.status());
                        return Err(io::Error::new(io::ErrorKind::Other, "healthcheck failed"));
                    }
                    Err(e) => {
                        eprintln!("healthcheck HTTP error: {}", e);
                        return Err(io::Error::new(io::ErrorKind::Other, "healthcheck error"));
                    }
                }
            }
        }
    }

    let _ = dotenvy::dotenv();
    init_tracing();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting chirp-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(env = %config.app.env, store = ?config.store, "Configuration loaded");

    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Content store initialization failed: {:#}", e);
            eprintln!("ERROR: Failed to initialize content store: {:#}", e);
            std::process::exit(1);
        }
    };

    let issuer = Arc::new(TokenIssuer::new(
        &config.auth.jwt_secret,
        config.auth.token_ttl_secs,
    ));
    let state = web::Data::new(AppState::new(
        store.clone(),
        issuer.clone(),
        config.feed.clone(),
    ));

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    let allowed_origins = config.cors.allowed_origins.clone();

    // Create HTTP server
    let server = HttpServer::new(move || {
        let mut cors = Cors::default();
        for origin in allowed_origins.split(',') {
            let origin = origin.trim();
            if origin.is_empty() {
                continue;
            }
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        let issuer = issuer.clone();
        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(move |cfg| handlers::configure(cfg, issuer))
    })
    .bind(&bind_address)?
    .run();

    tracing::info!(address = %bind_address, "HTTP server bound");

    let server_handle = server.handle();

    let (shutdown_tx, _) = broadcast::channel(1);
    let publisher_shutdown = shutdown_tx.subscribe();

    let mut tasks: JoinSet<io::Result<()>> = JoinSet::new();

    // HTTP server task
    tasks.spawn(async move {
        tracing::info!("HTTP server is running");
        server.await
    });

    // Scheduled post publisher
    let publisher = ScheduledPublisher::new(
        store.clone(),
        Duration::from_secs(config.publisher.interval_secs),
    );
    tasks.spawn(async move {
        publisher.run(publisher_shutdown).await;
        Ok(())
    });

    let mut first_error: Option<io::Error> = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = tasks.join_next() => {
                match result {
                    Some(Ok(Ok(_))) => {
                        tracing::info!("Background task completed");
                    }
                    Some(Ok(Err(e))) => {
                        tracing::error!("Task returned error: {}", e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Task join error: {}", e);
                        if first_error.is_none() {
                            first_error = Some(io::Error::new(io::ErrorKind::Other, e.to_string()));
                        }
                        let _ = shutdown_tx.send(());
                        server_handle.stop(true).await;
                        tasks.shutdown().await;
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(());
                server_handle.stop(true).await;
                tasks.shutdown().await;
                break;
            }
        }
    }

    tracing::info!("chirp-service shutting down");

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
