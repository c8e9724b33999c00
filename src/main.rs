//! Interchain relayer entrypoint (spec §2 "C9 Relayer root").
//!
//! Wires together the key/value store (C1), the audit log (C2), the hub
//! client (C5), and the chain registry (C6); performs startup recovery of
//! any chains this process previously registered; serves the administrative
//! HTTP API (C8) under `/api/v0/<family>`; and installs a graceful shutdown
//! path driven by SIGTERM/SIGINT.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON config file (default `config.json`)
//! - `HOST`/`PORT`/`KV_PATH` override the corresponding config defaults
//! - `RUST_LOG` controls log verbosity (default `info`)

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use sqlx::mysql::MySqlPoolOptions;
use tower_http::cors;

use irita_relayer::admin;
use irita_relayer::audit::SqlAuditLog;
use irita_relayer::config::Config;
use irita_relayer::hub::transport::HttpHubTransport;
use irita_relayer::hub::HubClient;
use irita_relayer::kvstore::SledKvStore;
use irita_relayer::registry::ChainRegistry;
use irita_relayer::util::{SigDown, Telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let _telemetry = Telemetry::init();

    let config = Config::load()?;
    tracing::info!(chain_family = %config.chain_family, "loaded relayer configuration");

    let kv = Arc::new(SledKvStore::open(&config.kv_path)?);

    let audit_pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(config.audit_database_url.inner())
        .await?;
    let audit = Arc::new(SqlAuditLog::new(audit_pool));
    audit.migrate().await?;

    let hub_transport = HttpHubTransport::new(config.hub.endpoint.inner().to_string());
    let hub = Arc::new(HubClient::new(
        hub_transport,
        Duration::from_secs(config.hub.watchdog_interval_secs),
    ));

    let registry = Arc::new(ChainRegistry::new(
        config.chain_family,
        kv.clone(),
        audit.clone(),
        hub.clone(),
    ));

    registry.recover().await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "startup recovery failed, aborting boot");
        std::process::exit(1);
    });

    let admin_prefix = format!("/api/v0/{}", config.chain_family);
    let http_endpoints = Router::new()
        .nest(&admin_prefix, admin::routes().with_state(registry.clone()))
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = std::net::SocketAddr::new(config.host, config.port);
    tracing::info!("starting admin HTTP server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
