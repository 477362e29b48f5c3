pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;

pub use state::AppState;

/// Assemble the full REST surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::orgs::router())
        .merge(routes::tasks::router())
        .merge(routes::messages::router())
        .merge(routes::sessions::router())
        .merge(routes::human_requests::router())
        .merge(routes::reviews::router())
        .merge(routes::git::router())
        .merge(routes::agents::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
