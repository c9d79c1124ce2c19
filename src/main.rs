//! Main entry point for the gateway failover controller

use gateway_failover::{api, backend, config::Settings, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }

    settings.validate()?;

    info!(
        topic = %settings.controller.topic_arn,
        alarm_prefix = %settings.controller.alarm_prefix,
        per_group_lock = settings.controller.per_group_lock,
        "Starting gateway failover controller"
    );

    let control_plane = backend::from_config(&settings.control_plane)?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::new(settings, control_plane));

    // Build the router
    let app = api::routes::create_router(app_state);

    info!("Listening for alarm notifications on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
