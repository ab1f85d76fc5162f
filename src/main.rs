mod analysis;
mod app;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod state;
mod uploads;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "imagegate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    if config.jwt.uses_default_secret() {
        tracing::warn!("JWT_SECRET is not set; using the insecure default, override it in production");
    }
    tracing::info!(
        ai_base_url = %config.ai.base_url,
        ai_timeout_secs = config.ai.timeout_secs,
        ai_max_retries = config.ai.max_retries,
        "analysis provider configured"
    );

    let (host, port) = (config.host.clone(), config.port);
    let app_state = AppState::init(config).await?;
    analysis::services::spawn_stale_sweeper(
        app_state.analyses.clone(),
        app_state.config.jobs.stale_after(),
        app_state.config.jobs.sweep_interval(),
    );
    let app = app::build_app(app_state);

    app::serve(app, &host, port).await
}
