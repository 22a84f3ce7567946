use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

mod handlers;
mod models;
mod services;
mod utils;

use handlers::{create_app, AppState};
use models::config::AppConfig;
use services::backend::{BackendSnapshotSource, DashboardBackend, Feed};
use services::detection::TracingView;
use services::geocode::Geocoder;
use services::poller::HttpSnapshotSource;
use services::session::{ConsoleSession, SessionSources};
use services::surveillance::{DetectionSource, SimulatedDetectionSource};
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: it decides where logs go
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    let _log_guard = init_logging(&config.logging)?;

    info!("Starting Aviator Console v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = config_error {
        warn!("Falling back to default configuration: {}", e);
    }

    let backend = Arc::new(DashboardBackend::new());
    let sources = session_sources(&config, &backend)?;
    let session = ConsoleSession::open(&config, sources, Arc::new(TracingView));

    let state = AppState {
        backend,
        geocoder: Arc::new(Geocoder::new(&config.geocoding)?),
        session: Arc::new(session),
        config: Arc::new(config.clone()),
    };

    let app = create_app(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Aviator Console stopped");
    Ok(())
}

fn session_sources(config: &AppConfig, backend: &Arc<DashboardBackend>) -> Result<SessionSources> {
    let detections: Option<Arc<dyn DetectionSource>> = if config.surveillance.enabled {
        Some(Arc::new(SimulatedDetectionSource::new(Arc::clone(backend)).with_warmup(30)))
    } else {
        None
    };

    let sources = match &config.polling.remote_base_url {
        Some(base) => {
            let base = base.trim_end_matches('/');
            let client = reqwest::Client::builder()
                .user_agent(concat!("aviator-console/", env!("CARGO_PKG_VERSION")))
                .timeout(std::time::Duration::from_secs(10))
                .build()?;
            info!("Polling remote console at {}", base);

            let dashboard_url = format!("{}/api/dashboard_data", base);
            SessionSources {
                dashboard: Arc::new(HttpSnapshotSource::new(client.clone(), dashboard_url.clone())),
                header: Arc::new(HttpSnapshotSource::new(client.clone(), dashboard_url)),
                flight: Arc::new(HttpSnapshotSource::new(client, format!("{}/api/flight_parameters", base))),
                detections,
            }
        }
        None => SessionSources {
            dashboard: Arc::new(BackendSnapshotSource::new(Arc::clone(backend), Feed::Dashboard)),
            header: Arc::new(BackendSnapshotSource::new(Arc::clone(backend), Feed::Header)),
            flight: Arc::new(BackendSnapshotSource::new(Arc::clone(backend), Feed::Flight)),
            detections,
        },
    };

    Ok(sources)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
}
