use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, RawQuery},
    response::Response,
    routing::get,
};
use serde_json::Value;

use tourbook_auth::Role;
use tourbook_core::{Resource, TourId};
use tourbook_query::Filter;
use tourbook_reviews::Review;

use crate::app::errors::ApiError;
use crate::app::extract::{JsonBody, query_params};
use crate::app::factory;
use crate::app::routes::protected;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::AuthState;

/// Only travellers write reviews.
const REVIEWERS: &[Role] = &[Role::User];

pub fn router(auth: &AuthState) -> Router {
    protected(
        auth,
        Router::new()
            .route("/", get(list_reviews).post(create))
            .route("/:id", get(get_review).patch(update_review).delete(delete_review)),
    )
}

pub async fn list_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    factory::list_all::<Review>(&services, Filter::new(), &query_params(query.as_deref())).await
}

pub async fn get_review(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    factory::get_one::<Review>(&services, &id).await
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    create_review(&services, &principal, body, None).await
}

/// Create a review, defaulting its tour to `tour` and its author to the
/// principal when the body leaves them out.
pub async fn create_review(
    services: &AppServices,
    principal: &PrincipalContext,
    mut body: Value,
    tour: Option<TourId>,
) -> Result<Response, ApiError> {
    principal.restrict_to(REVIEWERS)?;

    if let Value::Object(fields) = &mut body {
        if let Some(tour) = tour {
            fields.entry("tour").or_insert_with(|| Value::String(tour.to_string()));
        }
        fields
            .entry("user")
            .or_insert_with(|| Value::String(principal.id().to_string()));
    }
    factory::create_one::<Review>(services, body).await
}

pub async fn update_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    authorize_author(&services, &principal, &id, &[]).await?;
    factory::update_one::<Review>(&services, &id, body).await
}

pub async fn delete_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authorize_author(&services, &principal, &id, &[Role::Admin]).await?;
    factory::delete_one::<Review>(&services, &id).await
}

/// The review's author, or a role in `bypass`, may modify it.
async fn authorize_author(
    services: &AppServices,
    principal: &PrincipalContext,
    raw_id: &str,
    bypass: &[Role],
) -> Result<(), ApiError> {
    let id = Review::parse_id(raw_id)?;
    let review = services.reviews.find_by_id(id).await?.ok_or_else(ApiError::not_found)?;
    match review.user {
        Some(author) => principal.ensure_owner_or(author, bypass)?,
        None => principal.restrict_to(bypass)?,
    }
    Ok(())
}
