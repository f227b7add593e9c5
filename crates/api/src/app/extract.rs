//! Extractors whose rejections render through [`ApiError`].

use axum::{
    Json, async_trait,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use tourbook_query::RawParams;

use crate::app::errors::ApiError;

/// `Json<T>` with failures reported as 400 in the standard envelope.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(reject(rejection)),
        }
    }
}

fn reject(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(format!("Invalid input data. {}", rejection.body_text()))
}

/// The raw query string, parsed into Query Modifier parameters.
pub fn query_params(raw: Option<&str>) -> RawParams {
    raw.map(RawParams::from_query_str).unwrap_or_default()
}
