use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dungeonbox::{
    auth, broadcast,
    config::ServerConfig,
    llm,
    prompt::PromptConfig,
    relay::PromptRelay,
    state::AppState,
    types::GameConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dungeonbox=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DungeonBox...");

    let server_config = ServerConfig::from_env();
    let game_config = GameConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    // Initialize LLM providers for the built-in prompt relay
    let llm_config = llm::LlmConfig::from_env();
    let relay = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!(
                "LLM providers initialized: {}",
                manager
                    .providers
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            Some(Arc::new(PromptRelay::new(
                manager,
                llm_config.default_timeout,
                llm_config.default_max_tokens,
            )))
        }
        Err(e) => {
            tracing::warn!("Prompt relay disabled: {}", e);
            None
        }
    };

    let prompts = PromptConfig::from_env().build_service(relay.clone());

    let mut state = AppState::new_with(game_config, prompts).with_relay(relay);
    state.max_sessions = server_config.max_sessions;
    state.public_url = server_config.public_url.clone();
    let state = Arc::new(state);

    // Deadlines and completion checks for every room
    broadcast::spawn_phase_driver(state.clone(), server_config.tick_interval);

    let app = dungeonbox::app(state, auth_config);

    let addr = server_config.addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
