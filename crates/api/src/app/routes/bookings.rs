//! Bookings: checkout sessions, the gateway webhook, and staff CRUD.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, RawQuery},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde_json::{Value, json};

use tourbook_auth::Role;
use tourbook_bookings::Booking;
use tourbook_core::{Resource, TourId};
use tourbook_infra::{CheckoutRequest, CheckoutSession, SIGNATURE_HEADER};
use tourbook_query::Filter;
use tourbook_tours::Tour;

use crate::app::errors::ApiError;
use crate::app::extract::{JsonBody, query_params};
use crate::app::factory;
use crate::app::routes::protected;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;
use crate::middleware::AuthState;

const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];

pub fn router(auth: &AuthState) -> Router {
    protected(
        auth,
        Router::new()
            .route("/checkout-session/:tour_id", get(checkout_session))
            .route("/", get(list_bookings).post(create_booking))
            .route("/:id", get(get_booking).patch(update_booking).delete(delete_booking)),
    )
}

/// Start a hosted card payment for one tour.
pub async fn checkout_session(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(tour_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = Tour::parse_id(&tour_id)?;
    let tour = services.tours.find_by_id(id).await?.ok_or_else(ApiError::not_found)?;
    let public_url = &services.config.public_url;

    let request = CheckoutRequest {
        tour_id: tour.id.to_string(),
        tour_name: tour.name.clone(),
        tour_summary: tour.summary.clone(),
        image_url: format!("{public_url}/img/tours/{}", tour.image_cover),
        price: tour.price_or_zero(),
        customer_email: principal.email().to_string(),
        success_url: format!("{public_url}/my-tours?alert=booking"),
        cancel_url: format!("{public_url}/tour/{}", tour.slug),
    };
    let session = services.checkout.create_session(request).await?;

    Ok(Json(json!({ "status": "success", "session": session })).into_response())
}

/// Gateway callback; records a booking for each completed checkout.
pub async fn webhook_checkout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(verifier) = services.webhook.as_ref() else {
        return Ok(webhook_error("webhook secret is not configured"));
    };
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return Ok(webhook_error("No stripe-signature header value was provided."));
    };

    let event = match verifier.verify(&body, signature, Utc::now()) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "rejected webhook");
            return Ok(webhook_error(&e.to_string()));
        }
    };

    match event.completed_session() {
        Ok(Some(session)) => book_from_session(&services, session).await?,
        Ok(None) => tracing::debug!(kind = %event.kind, "ignored webhook event"),
        Err(e) => return Ok(webhook_error(&e.to_string())),
    }

    Ok(Json(json!({ "received": true })).into_response())
}

fn webhook_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, format!("Webhook error: {message}")).into_response()
}

async fn book_from_session(services: &AppServices, session: CheckoutSession) -> Result<(), ApiError> {
    let tour = session
        .client_reference_id
        .as_deref()
        .and_then(|id| id.parse::<TourId>().ok());
    let user = match session.customer_email.as_deref() {
        Some(email) => {
            services
                .users
                .find_one(Filter::new().eq("email", email.trim().to_lowercase()))
                .await?
        }
        None => None,
    };

    let (Some(tour), Some(user), Some(amount)) = (tour, user, session.amount_total) else {
        tracing::warn!(session = %session.id, "completed session does not match a tour and user");
        return Ok(());
    };

    let booking = Booking::paid(tour, user.id, amount as f64 / 100.0, Utc::now());
    let booking = services.bookings.insert(booking).await?;
    tracing::info!(booking = %booking.id, session = %session.id, "booking recorded");
    Ok(())
}

pub async fn list_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    principal.restrict_to(STAFF)?;
    factory::list_all::<Booking>(&services, Filter::new(), &query_params(query.as_deref())).await
}

pub async fn get_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(STAFF)?;
    factory::get_one::<Booking>(&services, &id).await
}

pub async fn create_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    principal.restrict_to(STAFF)?;
    factory::create_one::<Booking>(&services, body).await
}

pub async fn update_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, ApiError> {
    principal.restrict_to(STAFF)?;
    factory::update_one::<Booking>(&services, &id, body).await
}

pub async fn delete_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    principal.restrict_to(STAFF)?;
    factory::delete_one::<Booking>(&services, &id).await
}
