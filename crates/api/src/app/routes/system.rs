use axum::{extract::OriginalUri, http::StatusCode};

use crate::app::errors::ApiError;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::NotFound(format!("Can't find {} on this server.", uri.path()))
}
