// Public API for integration tests and the player client

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompt;
pub mod protocol;
pub mod relay;
pub mod state;
pub mod types;
pub mod ws;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Build the full router: player WS and REST, prompt relay, and the
/// Basic-auth protected host routes
pub fn app(state: Arc<AppState>, auth_config: Arc<AuthConfig>) -> Router {
    let host_routes = Router::new()
        .route("/host/ws", get(ws::host_ws_handler))
        .route(
            "/host/api/games",
            get(api::list_sessions).post(api::create_session),
        )
        .route(
            "/host/api/games/{code}",
            get(api::host_snapshot).delete(api::close_session),
        )
        .route("/host/api/games/{code}/phase", post(api::transition_phase))
        .layer(middleware::from_fn_with_state(
            auth_config,
            auth::host_auth_middleware,
        ));

    let player_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/games/{code}", get(api::get_game))
        .route("/api/games/{code}/state", get(api::get_state))
        .route(
            "/api/games/{code}/players",
            get(api::get_players).post(api::join_game),
        )
        .route(
            "/api/games/{code}/players/{player_id}/start",
            post(api::request_start),
        )
        .route(
            "/api/games/{code}/answers",
            get(api::get_answers).post(api::submit_answer),
        )
        .route(
            "/api/games/{code}/answers/{answer_id}/votes",
            post(api::cast_vote),
        )
        .route("/api/prompt", post(relay::prompt_handler));

    Router::new()
        .merge(player_routes)
        .merge(host_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
