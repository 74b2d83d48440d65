//! FlightSurety Oracle Server
//!
//! Registers simulated oracles with the FlightSuretyApp contract, answers its
//! `OracleRequest` events, and serves a small status API for the DApp.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flightsurety_server::app_state::AppState;
use flightsurety_server::config::AppConfig;
use flightsurety_server::ledger::{Web3Client, WsEventSource};
use flightsurety_server::routes;
use flightsurety_server::services::{CoordinatorSettings, OracleCoordinator, OraclePool};

const LISTENER_SUPERVISOR_MAX_BACKOFF_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    info!(
        rpc_url = %config.ledger.rpc_url,
        ws_url = %config.ledger.ws_url,
        app_address = %config.ledger.contracts.app_address,
        data_address = %config
            .ledger
            .contracts
            .data_address
            .map_or_else(|| "unset".to_string(), |address| address.to_string()),
        oracle_count = config.oracles.oracle_count,
        "oracle server configured"
    );

    let mut coordinator = OracleCoordinator::new(
        Arc::new(Web3Client::new(&config.ledger)),
        Arc::new(WsEventSource::new(&config.ledger)),
        OraclePool::new(),
        CoordinatorSettings {
            max_oracles: config.oracles.oracle_count,
        },
    );

    let attempts = config.oracles.registration_retries.max(1);
    for attempt in 1..=attempts {
        match coordinator.bootstrap().await {
            Ok(_) => break,
            Err(err) if attempt < attempts => {
                let backoff_seconds = 2u64.saturating_pow(attempt);
                warn!(attempt, backoff_seconds, error = %err, "oracle registration attempt failed");
                sleep(Duration::from_secs(backoff_seconds)).await;
            }
            Err(err) => {
                error!(error = %err, "giving up on oracle registration; listening with an empty pool");
            }
        }
    }

    let coordinator = Arc::new(coordinator);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(forward_ctrl_c(tokio::signal::ctrl_c(), shutdown_tx));

    // Answer oracle requests in the background, restarting after transport loss.
    let listener = tokio::spawn(supervise_listener(
        Arc::clone(&coordinator),
        shutdown_rx.clone(),
    ));

    let app = routes::app(AppState::new(coordinator))
        .layer(build_cors_layer(&config.server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Server starting on {}", addr);

    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await
        .context("serving HTTP API")?;

    if let Err(join_error) = listener.await {
        error!(error = %join_error, "oracle listener task failed");
    }
    Ok(())
}

async fn supervise_listener(coordinator: Arc<OracleCoordinator>, shutdown: watch::Receiver<bool>) {
    let mut restart_count: u32 = 0;
    loop {
        match Arc::clone(&coordinator)
            .listen(wait_for_shutdown(shutdown.clone()))
            .await
        {
            Ok(()) => {
                info!("oracle listener exited cleanly; stopping supervisor");
                break;
            }
            Err(err) => {
                error!(error = %err, "oracle listener stopped; restarting");
            }
        }

        if *shutdown.borrow() {
            break;
        }

        restart_count = restart_count.saturating_add(1);
        let backoff_seconds = (2u64.saturating_pow(restart_count.min(5)))
            .min(LISTENER_SUPERVISOR_MAX_BACKOFF_SECONDS);
        warn!(restart_count, backoff_seconds, "oracle listener restart backoff");
        sleep(Duration::from_secs(backoff_seconds)).await;
    }
}

/// Flip `shutdown` once `signal` fires.
///
/// If the signal handler cannot be installed the sender is held forever, since
/// dropping it would also wake every `wait_for_shutdown`.
async fn forward_ctrl_c<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("ctrl-c received");
            let _ = shutdown.send(true);
        }
        Err(err) => {
            error!(error = %err, "could not install ctrl-c handler; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(false)
}
