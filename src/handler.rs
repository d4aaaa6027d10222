use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::PathRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::model::{Book, NewBook};
use crate::repository::BookRepository;

#[derive(Clone)]
pub struct AppState {
    pub books: Arc<dyn BookRepository>,
}

impl AppState {
    pub fn new(books: Arc<dyn BookRepository>) -> Self {
        Self { books }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(HealthResponse { status: "ok" })
}

// The body is decoded as JSON whatever the content type says.
fn parse_body(payload: &[u8]) -> ApiResult<NewBook> {
    let book = NewBook::from_json(payload).map_err(|e| {
        tracing::info!(error = %e, "rejected request body");
        ApiError::InvalidBody
    })?;

    if !book.is_valid() {
        return Err(ApiError::Validation);
    }
    Ok(book)
}

fn parse_id(id: Result<Path<i64>, PathRejection>) -> ApiResult<i64> {
    id.map(|Path(id)| id).map_err(|_| ApiError::InvalidId)
}

fn store_error(action: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
    move |e| {
        tracing::error!(error = %e, "failed to {}", action);
        ApiError::Store(e)
    }
}

pub async fn create_book(
    State(state): State<AppState>,
    payload: Bytes,
) -> ApiResult<(StatusCode, Json<Book>)> {
    let input = parse_body(&payload)?;
    let book = state.books.create(input).await.map_err(store_error("create book"))?;

    info!(id = book.id, title = %book.title, "created book");
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn get_books(State(state): State<AppState>) -> ApiResult<Json<Vec<Book>>> {
    let books = state.books.list().await.map_err(store_error("get books"))?;
    Ok(Json(books))
}

pub async fn update_book(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Bytes,
) -> ApiResult<Json<Book>> {
    let id = parse_id(id)?;
    let input = parse_body(&payload)?;

    // An id with no row still answers with the submitted record.
    match state.books.update(id, input.clone()).await.map_err(store_error("update book"))? {
        Some(book) => {
            info!(id, "updated book");
            Ok(Json(book))
        }
        None => {
            info!(id, "update matched no book");
            Ok(Json(input.into_book(id)))
        }
    }
}

pub async fn delete_book(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = parse_id(id)?;

    if state.books.delete(id).await.map_err(store_error("delete book"))? {
        info!(id, "deleted book");
    } else {
        info!(id, "delete matched no book");
    }
    Ok(StatusCode::NO_CONTENT)
}
