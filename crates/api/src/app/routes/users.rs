//! Accounts: signup, login, password flows, self-service and admin CRUD.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, RawQuery},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use tourbook_auth::{NewUser, Role, User, hash_reset_token};
use tourbook_infra::EmailTemplate;
use tourbook_query::Filter;

use crate::app::errors::ApiError;
use crate::app::extract::{JsonBody, query_params};
use crate::app::factory::{self, render};
use crate::app::routes::protected;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::{AuthState, LOGGED_OUT, TOKEN_COOKIE};

const ADMINS: &[Role] = &[Role::Admin];
const PASSWORD_FIELDS: [&str; 2] = ["password", "passwordConfirm"];
const SELF_EDITABLE: [&str; 2] = ["name", "email"];
const LOGOUT_COOKIE_SECS: i64 = 10;

pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
        .merge(protected(
            auth,
            Router::new()
                .route("/updateMyPassword", patch(update_my_password))
                .route("/me", get(me))
                .route("/updateMe", patch(update_me))
                .route("/deleteMe", axum::routing::delete(delete_me))
                .route("/", get(list_users).post(create_user))
                .route("/:id", get(get_user).patch(update_user).delete(delete_user)),
        ))
}

// -------------------------
// Tokens and cookies
// -------------------------

fn cookie(value: &str, expires: DateTime<Utc>, secure: bool) -> String {
    let mut cookie = format!(
        "{TOKEN_COOKIE}={value}; Expires={}; Path=/; HttpOnly",
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Issue a token for `user` and answer with it in the body and a cookie.
fn send_token(services: &AppServices, user: &User, status: StatusCode) -> Result<Response, ApiError> {
    let now = Utc::now();
    let token = services.jwt.issue(user.id, now)?;
    let secure = !services.config.environment.is_development();
    let set_cookie = cookie(&token, now + services.config.jwt_cookie_expires_in, secure);

    Ok((
        status,
        [(header::SET_COOKIE, set_cookie)],
        Json(json!({
            "status": "success",
            "token": token,
            "data": { "user": render(user)? },
        })),
    )
        .into_response())
}

fn reject_password_fields(body: &Value) -> Result<(), ApiError> {
    if PASSWORD_FIELDS.iter().any(|field| body.get(field).is_some()) {
        return Err(ApiError::BadRequest(
            "This route is not for password updates. Please use /updateMyPassword.".to_string(),
        ));
    }
    Ok(())
}

async fn find_by_email(services: &AppServices, email: &str) -> Result<Option<User>, ApiError> {
    let email = email.trim().to_lowercase();
    Ok(services.users.find_one(Filter::new().eq("email", email)).await?)
}

// -------------------------
// Public account flows
// -------------------------

pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(input): JsonBody<NewUser>,
) -> Result<Response, ApiError> {
    let user = User::register(input, Utc::now())?;
    let user = services.users.insert(user).await?;
    tracing::info!(user = %user.id, "user signed up");

    let welcome = EmailTemplate::Welcome {
        name: user.name.clone(),
        url: format!("{}/me", services.config.public_url),
    };
    if let Err(e) = services.mailer.send(welcome.render(&user.email)).await {
        tracing::error!(user = %user.id, error = %e, "welcome email failed");
    }

    send_token(&services, &user, StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<Response, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::BadRequest("Please provide email and password!".to_string()));
    }

    let user = find_by_email(&services, &body.email).await?;
    match user {
        Some(user) if user.correct_password(&body.password) => send_token(&services, &user, StatusCode::OK),
        _ => Err(ApiError::Unauthorized("Incorrect email or password".to_string())),
    }
}

pub async fn logout(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let secure = !services.config.environment.is_development();
    let expires = Utc::now() + Duration::seconds(LOGOUT_COOKIE_SECS);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie(LOGGED_OUT, expires, secure))],
        Json(json!({ "status": "success" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    email: String,
}

pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    JsonBody(body): JsonBody<ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    let mut user = find_by_email(&services, &body.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("There is no user with that email address.".to_string()))?;

    let token = user.create_password_reset_token(Utc::now());
    let user = services.users.save(user).await?.ok_or_else(ApiError::not_found)?;

    let reset = EmailTemplate::PasswordReset {
        url: format!("{}/api/v1/users/resetPassword/{token}", services.config.public_url),
    };
    if let Err(e) = services.mailer.send(reset.render(&user.email)).await {
        tracing::error!(user = %user.id, error = %e, "password reset email failed");
        let mut user = user;
        user.clear_reset_token();
        services.users.save(user).await?;
        return Err(ApiError::Failed(
            "There was an error sending the email. Try again later!".to_string(),
        ));
    }

    Ok(Json(json!({ "status": "success", "message": "Token sent to email!" })).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[serde(default)]
    password_current: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_confirm: String,
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
    JsonBody(body): JsonBody<PasswordChange>,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let invalid = || ApiError::BadRequest("Token is invalid or has expired".to_string());

    let mut user = services
        .users
        .find_one(Filter::new().eq("passwordResetToken", hash_reset_token(&token)))
        .await?
        .filter(|user| user.reset_token_matches(&token, now))
        .ok_or_else(invalid)?;

    user.set_password(&body.password, &body.password_confirm, now)?;
    let user = services.users.save(user).await?.ok_or_else(invalid)?;
    tracing::info!(user = %user.id, "password reset");
    send_token(&services, &user, StatusCode::OK)
}

// -------------------------
// Self-service (authenticated)
// -------------------------

pub async fn update_my_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    JsonBody(body): JsonBody<PasswordChange>,
) -> Result<Response, ApiError> {
    let mut user = services
        .users
        .find_by_id(principal.id())
        .await?
        .ok_or_else(ApiError::not_found)?;

    if !user.correct_password(&body.password_current) {
        return Err(ApiError::Unauthorized("Your current password is wrong.".to_string()));
    }

    user.set_password(&body.password, &body.password_confirm, Utc::now())?;
    let user = services.users.save(user).await?.ok_or_else(ApiError::not_found)?;
    send_token(&services, &user, StatusCode::OK)
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    factory::get_one::<User>(&services, &principal.id().to_string()).await
}

pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    reject_password_fields(&body)?;

    let allowed: Map<String, Value> = match body {
        Value::Object(fields) => fields
            .into_iter()
            .filter(|(key, _)| SELF_EDITABLE.contains(&key.as_str()))
            .collect(),
        _ => Map::new(),
    };

    let user = services
        .users
        .update_by_id(principal.id(), Value::Object(allowed))
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(json!({ "status": "success", "data": { "user": render(&user)? } })).into_response())
}

/// Deactivate the account; it disappears from every read.
pub async fn delete_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    services
        .users
        .update_by_id(principal.id(), json!({ "active": false }))
        .await?
        .ok_or_else(ApiError::not_found)?;
    tracing::info!(user = %principal.id(), "account deactivated");
    Ok(StatusCode::NO_CONTENT.into_response())
}

// -------------------------
// Administration
// -------------------------

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    principal.restrict_to(ADMINS)?;
    factory::list_all::<User>(&services, Filter::new(), &query_params(query.as_deref())).await
}

pub async fn create_user(Extension(principal): Extension<PrincipalContext>) -> Result<Response, ApiError> {
    principal.restrict_to(ADMINS)?;
    Err(ApiError::Failed(
        "This route is not defined! Please use /signup instead".to_string(),
    ))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(ADMINS)?;
    factory::get_one::<User>(&services, &id).await
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    principal.restrict_to(ADMINS)?;
    reject_password_fields(&body)?;
    factory::update_one::<User>(&services, &id, body).await
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(ADMINS)?;
    factory::delete_one::<User>(&services, &id).await
}
