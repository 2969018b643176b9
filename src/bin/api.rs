use finance_agent_session::{
    agent::SessionController,
    api::start_server,
    config::SessionConfig,
    runtime::{RetryingRuntime, ScriptedRuntime},
    state::InMemorySessionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often stale approvals and idle sessions are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Also loads .env
    let config = SessionConfig::from_env()?;

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Finance Agent Session - API Server");
    info!(port = api_port, "Configuration loaded");

    // Scripted agent behaviour for local runs
    let scripted = ScriptedRuntime::new();
    match std::env::var("AGENT_SCRIPTS") {
        Ok(path) => {
            let json = tokio::fs::read_to_string(&path).await?;
            let count = scripted.push_json(&json).await?;
            info!(path = %path, count, "Loaded agent scripts");
        }
        Err(_) => warn!("AGENT_SCRIPTS not set; every turn will fail with a runtime error"),
    }

    let runtime = RetryingRuntime::new(scripted, config.retry.clone());
    let controller = Arc::new(SessionController::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(runtime),
        config,
    ));

    controller.restore_pending_interrupts().await?;
    let _sweeper = controller.clone().spawn_timeout_sweeper(SWEEP_INTERVAL);

    info!("Session controller initialized");
    info!("Starting API server...");

    // Start API server
    start_server(controller, api_port).await?;

    Ok(())
}
