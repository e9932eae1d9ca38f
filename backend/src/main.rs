use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reminder_bridge::config::Config;
use reminder_bridge::db::DbConnection;
use reminder_bridge::domain::{ProfileService, ReminderService};
use reminder_bridge::rest::{self, AppState};
use reminder_bridge::scheduler::CronJobClient;
use reminder_bridge::voice::VoiceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reminder_bridge=info,tower_http=info")),
        )
        .init();

    let config = Arc::new(Config::from_env().context("Invalid configuration")?);
    info!("Loaded configuration: {:?}", config);

    info!("Setting up database");
    let db = DbConnection::new(&config.database_url).await?;

    info!("Setting up services");
    let profile_service = ProfileService::new(db.clone());
    let reminder_service = ReminderService::new(
        db,
        CronJobClient::new(&config.cron),
        VoiceClient::new(&config.voice),
        config.clone(),
    );

    let state = AppState::new(config.clone(), profile_service, reminder_service);
    let app = rest::create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
