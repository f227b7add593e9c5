//! Central error translation: every failure a handler can produce becomes an
//! [`ApiError`], rendered here as `{status, message}`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use tourbook_auth::{AuthError, AuthzError, TokenError};
use tourbook_core::DomainError;
use tourbook_infra::{CheckoutError, StoreError};
use tourbook_query::QueryError;

use crate::config::Environment;

const GENERIC_MESSAGE: &str = "Something went wrong!";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A server-side failure whose message is safe to show.
    #[error("{0}")]
    Failed(String),

    /// A programming or infrastructure failure; the detail is only logged.
    #[error("{0}")]
    Unknown(String),
}

/// Detail of an unknown failure, attached to the response for
/// [`expose_error_detail`].
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl ApiError {
    pub fn not_found() -> Self {
        ApiError::NotFound("No document found with that ID".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Failed(_) | ApiError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Unknown(detail) => {
                tracing::error!(error = %detail, "unhandled error");
                let mut response = json_error(status, GENERIC_MESSAGE);
                response.extensions_mut().insert(ErrorDetail(detail));
                response
            }
            other => json_error(status, other.to_string()),
        }
    }
}

/// `{status: "fail" | "error", message}`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    let kind = if status.is_server_error() { "error" } else { "fail" };
    (
        status,
        Json(json!({
            "status": kind,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// In development, add the logged detail of unknown failures to the body.
pub async fn expose_error_detail(State(environment): State<Environment>, mut response: Response) -> Response {
    if !environment.is_development() {
        return response;
    }
    match response.extensions_mut().remove::<ErrorDetail>() {
        Some(ErrorDetail(detail)) => (
            response.status(),
            Json(json!({
                "status": "error",
                "message": GENERIC_MESSAGE,
                "error": detail,
            })),
        )
            .into_response(),
        None => response,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::BadRequest(format!("Invalid input data. {msg}")),
            DomainError::InvalidId(msg) => ApiError::BadRequest(msg),
            DomainError::NotFound => ApiError::not_found(),
            DomainError::Duplicate { value, .. } => {
                ApiError::BadRequest(format!("Duplicate field value: {value}. Please use another value!"))
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(domain) => domain.into(),
            other => ApiError::Unknown(other.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(format!("Invalid input data. {err}"))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid | TokenError::Expired => ApiError::Unauthorized(err.to_string()),
            TokenError::Signing => ApiError::Unknown(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Domain(domain) => domain.into(),
            AuthError::Token(token) => token.into(),
            other => ApiError::Unknown(other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Unknown(format!("checkout failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_become_client_errors() {
        let err: ApiError = DomainError::validation("A tour must have a name").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid input data. A tour must have a name");

        let err: ApiError = DomainError::duplicate("name", "The Forest Hiker").into();
        assert_eq!(
            err.to_string(),
            "Duplicate field value: The Forest Hiker. Please use another value!"
        );

        let err: ApiError = StoreError::Domain(DomainError::NotFound).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn token_and_permission_failures() {
        let err: ApiError = TokenError::Expired.into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Your token has expired! Please log in again.");

        let err: ApiError = AuthzError::Forbidden.into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn infrastructure_failures_hide_their_detail() {
        let err: ApiError = StoreError::Unavailable("connection refused".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorDetail>().map(|d| d.0.as_str()),
            Some("store unavailable: connection refused")
        );
    }
}
