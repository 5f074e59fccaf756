use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod db;
mod errors;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = config::Config::from_env()?;
    tracing::info!(env = %config.app_env, "Starting turnera backend");

    // ── Database ──────────────────────────────────────────────
    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;

    // ── Seed accounts ─────────────────────────────────────────
    auth::seed::seed_accounts(&pool, &config).await?;

    let app_state = AppState::new(pool, config)?;

    if app_state.tts.is_enabled() {
        tracing::info!("Server-side speech synthesis enabled");
    } else {
        tracing::warn!("TTS_API_KEY not set; clients will use browser speech synthesis");
    }

    // Create the settings file up front so admins can edit it by hand.
    app_state.settings.get().await?;
    tracing::info!(path = %app_state.settings.path().display(), "Settings loaded");

    // ── Background jobs ───────────────────────────────────────
    services::tts::spawn_audio_cleanup(app_state.tts.audio_dir().to_path_buf());

    let addr: SocketAddr = format!(
        "{}:{}",
        app_state.config.backend_host,
        app_state.config.backend_port
    )
    .parse()?;

    // ── Router ────────────────────────────────────────────────
    let app = routes::app(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
