use axum::{Router, http::Method};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handler::AppState;

pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod model;
pub mod repository;
pub mod routes;

/// Builds the service with its middleware, ready to be served.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
