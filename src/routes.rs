use axum::{
    Router,
    routing::{get, put},
};

use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/health", get(handler::healthcheck))
        .route("/books", get(handler::get_books).post(handler::create_book))
        .route("/books/:id", put(handler::update_book).delete(handler::delete_book))
}
