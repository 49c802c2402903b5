use axum::{Router, routing::get};

use crate::AppState;

pub mod config;
pub mod evaluate;
pub mod frontend;
pub mod health;

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new()
        .route("/health", get(health::health_check))
        .merge(config::router())
        .merge(evaluate::router(&state))
        .with_state(state);

    Router::new()
        .route("/", get(frontend::serve_frontend_root))
        .route("/{*path}", get(frontend::serve_frontend))
        .nest("/api", base_routes)
}
