use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, RawQuery},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde_json::{Value, json};

use tourbook_auth::Role;
use tourbook_core::{DomainError, Resource};
use tourbook_query::Filter;
use tourbook_reviews::Review;
use tourbook_tours::{DistanceUnit, LatLng, Tour, distances_from, monthly_plan, tour_stats, within_radius};

use crate::app::errors::ApiError;
use crate::app::extract::{JsonBody, query_params};
use crate::app::factory::{self, Handled, ReadMode};
use crate::app::routes::{guarded, reviews};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::AuthState;

/// Roles allowed to manage the catalogue.
const CURATORS: &[Role] = &[Role::Admin, Role::LeadGuide];
const PLANNERS: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];

pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route("/top-5-cheap", get(top_five_cheap))
        .route("/tour-stats", get(stats))
        .route("/monthly-plan/:year", guarded(auth, get(plan)))
        .route("/tours-within/:distance/center/:latlng/unit/:unit", get(tours_within))
        .route("/distances/:latlng/unit/:unit", get(distances))
        .route("/", get(list_tours).merge(guarded(auth, post(create_tour))))
        .route(
            "/:id",
            get(get_tour).merge(guarded(auth, patch(update_tour).delete(delete_tour))),
        )
        .route(
            "/:id/reviews",
            guarded(auth, get(list_tour_reviews).post(create_tour_review)),
        )
}

pub async fn list_tours(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    factory::list_all::<Tour>(&services, Filter::new(), &query_params(query.as_deref())).await
}

/// Five best-rated tours, cheapest first among equals.
pub async fn top_five_cheap(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let mut params = query_params(query.as_deref());
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("fields", "name,price,ratingsAverage,summary,difficulty");
    factory::list_all::<Tour>(&services, Filter::new(), &params).await
}

pub async fn get_tour(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    factory::get_one::<Tour>(&services, &id).await
}

pub async fn create_tour(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    principal.restrict_to(CURATORS)?;
    factory::create_one::<Tour>(&services, body).await
}

pub async fn update_tour(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    principal.restrict_to(CURATORS)?;
    factory::update_one::<Tour>(&services, &id, body).await
}

pub async fn delete_tour(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(CURATORS)?;
    factory::delete_one::<Tour>(&services, &id).await
}

pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> Result<Response, ApiError> {
    let tours = services.tours.find_entities(Filter::new()).await?;
    let stats = tour_stats(&tours);
    Ok(Json(json!({ "status": "success", "data": { "stats": stats } })).into_response())
}

pub async fn plan(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(year): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(PLANNERS)?;
    let year: i32 = year
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid year: {year}")))?;

    let tours = services.tours.find_entities(Filter::new()).await?;
    let plan = monthly_plan(&tours, year);
    Ok(Json(json!({ "status": "success", "data": { "plan": plan } })).into_response())
}

pub async fn tours_within(
    Extension(services): Extension<Arc<AppServices>>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let center: LatLng = latlng.parse().map_err(verbatim)?;
    let unit: DistanceUnit = unit.parse().map_err(verbatim)?;
    let distance: f64 = distance
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid distance: {distance}")))?;

    let tours = services.tours.find_entities(Filter::new()).await?;
    let mut docs = Vec::new();
    for tour in within_radius(&tours, center, distance, unit) {
        let mut doc = factory::render(tour)?;
        Tour::expand(&services, &mut doc, ReadMode::List).await?;
        docs.push(doc);
    }

    Ok(Json(json!({
        "status": "success",
        "results": docs.len(),
        "data": { "data": docs },
    }))
    .into_response())
}

pub async fn distances(
    Extension(services): Extension<Arc<AppServices>>,
    Path((latlng, unit)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let center: LatLng = latlng.parse().map_err(verbatim)?;
    let unit: DistanceUnit = unit.parse().map_err(verbatim)?;

    let tours = services.tours.find_entities(Filter::new()).await?;
    let distances = distances_from(&tours, center, unit);
    Ok(Json(json!({ "status": "success", "data": { "data": distances } })).into_response())
}

pub async fn list_tour_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let tour = Tour::parse_id(&id)?;
    let scope = Filter::new().eq("tour", tour.to_string());
    factory::list_all::<Review>(&services, scope, &query_params(query.as_deref())).await
}

pub async fn create_tour_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    let tour = Tour::parse_id(&id)?;
    reviews::create_review(&services, &principal, body, Some(tour)).await
}

/// Parameter errors whose message is already user-facing.
fn verbatim(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(msg) | DomainError::InvalidId(msg) => ApiError::BadRequest(msg),
        other => other.into(),
    }
}
