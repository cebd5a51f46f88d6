use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use whisperfleet_api::{build_router, state::AppState};
use whisperfleet_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "whisperfleet_api=debug,whisperfleet_transcription=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!("Starting WhisperFleet API on {}:{}", settings.app.host, settings.app.port);
    info!(
        model = %settings.transcription.model_size,
        compute_type = %settings.transcription.compute_type,
        devices = ?settings.transcription.device_ids,
        max_workers = settings.transcription.max_workers,
        "Transcription config"
    );

    let app_state = AppState::from_settings(settings.clone())?;
    let service = app_state.service.clone();

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
