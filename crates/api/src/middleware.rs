use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use tourbook_auth::{JwtValidator, User};
use tourbook_infra::EntityStore;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// Cookie carrying the session token for browser clients.
pub const TOKEN_COOKIE: &str = "jwt";

/// Cookie value written on logout; never a token.
pub const LOGGED_OUT: &str = "loggedout";

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub users: Arc<dyn EntityStore<User>>,
}

/// Require a valid token whose user still exists and has not changed their
/// password since it was issued.
pub async fn protect(State(state): State<AuthState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_token(req.headers())
        .ok_or_else(|| ApiError::Unauthorized("You are not logged in! Please log in to get access.".to_string()))?;

    let claims = state.jwt.validate(&token, Utc::now())?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("The user belonging to this token no longer exists.".to_string()))?;

    if user.changed_password_after(claims.iat) {
        return Err(ApiError::Unauthorized(
            "User recently changed password! Please log in again.".to_string(),
        ));
    }

    tracing::debug!(user = %user.id, role = %user.role, "authenticated");
    req.extensions_mut()
        .insert(PrincipalContext::new(user.id, user.role, user.email));

    Ok(next.run(req).await)
}

/// Bearer header first, then the `jwt` cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer(headers) {
        return Some(token.to_string());
    }
    extract_cookie(headers, TOKEN_COOKIE)
        .filter(|value| *value != LOGGED_OUT)
        .map(str::to_string)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn extract_cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
