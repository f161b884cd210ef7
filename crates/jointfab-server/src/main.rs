//! Joint fabric node binary.
//!
//! Starts an axum HTTP server with structured logging, the fabric database,
//! the background expiry task, and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use jointfab_admin::LoggingAdvertiser;
use jointfab_certs::LocalCredentialIssuer;
use jointfab_fabric::{FabricTable, SqliteFabricStore};
use jointfab_server::{app, background, config, AppState, NodeState};
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("JOINTFAB_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let pool = jointfab_db::create_pool(
        &config.database.path,
        jointfab_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            jointfab_db::run_migrations(&conn).expect("failed to run database migrations");
        let version = jointfab_db::schema_version(&conn).expect("failed to read schema version");
        tracing::info!(applied, schema_version = ?version, "fabric database schema ready");
    }

    let fabrics = FabricTable::open(
        config.fabric.max_fabrics,
        Box::new(SqliteFabricStore::new(pool)),
    )
    .expect("failed to load fabric table");

    // Operational and intermediate keys live in memory only.
    let issuer = LocalCredentialIssuer::generate();
    tracing::info!(?issuer, "credential issuer ready");

    let node = NodeState::from_config(
        &config,
        fabrics,
        Box::new(issuer),
        Arc::new(LoggingAdvertiser::new()),
    );
    let state = AppState::new(node);

    tokio::spawn(background::start_expiry_task(
        state.clone(),
        Duration::from_secs(1),
    ));

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting jointfab server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("jointfab server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
