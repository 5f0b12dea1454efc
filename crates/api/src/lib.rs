pub mod chat;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Room routes
    let room_routes = Router::new()
        .route("/", get(routes::room::list))
        .route("/open", post(routes::room::open))
        .route("/{room_id}", get(routes::room::get))
        .route("/{room_id}/close", post(routes::room::close))
        .route("/{room_id}/reopen", post(routes::room::reopen));

    // Message routes (under room)
    let message_routes = Router::new()
        .route("/", get(routes::message::list))
        .route("/", post(routes::message::create))
        .route("/read", post(routes::message::read));

    let api = Router::new()
        .nest("/room", room_routes)
        .nest("/room/{room_id}/message", message_routes);

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
