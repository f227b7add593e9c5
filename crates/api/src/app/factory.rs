//! Generic resource handlers.
//!
//! One implementation of list / get / create / update / delete serves every
//! entity type. Entity-specific behaviour enters through [`Handled`]: which
//! store to use, how to expand references on read, and what to refresh after
//! a write.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};

use tourbook_auth::User;
use tourbook_bookings::Booking;
use tourbook_core::{Resource, TourId, UserId};
use tourbook_infra::store::{decode_input, merge_patch};
use tourbook_infra::{DocumentQuery, EntityStore};
use tourbook_query::{Filter, QueryModifier, RawParams};
use tourbook_reviews::{RatingSummary, Review};
use tourbook_tours::Tour;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// How a document is being read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadMode {
    List,
    Detail,
}

/// An entity type served through the generic handlers.
#[async_trait]
pub trait Handled: Resource {
    fn store(services: &AppServices) -> &dyn EntityStore<Self>;

    /// Replace references in a rendered document with the records they name.
    async fn expand(_services: &AppServices, _doc: &mut Value, _mode: ReadMode) -> Result<(), ApiError> {
        Ok(())
    }

    /// Refresh state derived from this entity after it was written or deleted.
    /// `previous` is the stored version an update replaced.
    async fn after_write(_services: &AppServices, _previous: Option<&Self>, _entity: &Self) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Run the post-write hook. The write itself is already committed, so a
/// failed refresh is logged rather than reported to the client.
async fn settle<T: Handled>(services: &AppServices, previous: Option<&T>, entity: &T) {
    if let Err(err) = T::after_write(services, previous, entity).await {
        tracing::error!(collection = T::COLLECTION, id = %entity.id(), error = %err, "post-write refresh failed");
    }
}

// -------------------------
// Rendering
// -------------------------

/// The public form of `entity`: its document minus hidden fields.
pub fn render<T: Resource>(entity: &T) -> Result<Value, ApiError> {
    let doc = serde_json::to_value(entity).map_err(|e| ApiError::Unknown(e.to_string()))?;
    Ok(strip_hidden::<T>(doc))
}

fn strip_hidden<T: Resource>(mut doc: Value) -> Value {
    if let Value::Object(fields) = &mut doc {
        for hidden in T::HIDDEN_FIELDS {
            fields.remove(*hidden);
        }
    }
    doc
}

pub fn success(status: StatusCode, data: Value) -> Response {
    (status, Json(json!({ "status": "success", "data": { "data": data } }))).into_response()
}

// -------------------------
// Operations
// -------------------------

/// Query-shaped list of `T`, scoped by `scope`.
pub async fn list_all<T: Handled>(services: &AppServices, scope: Filter, params: &RawParams) -> Result<Response, ApiError> {
    let query = QueryModifier::new(DocumentQuery::matching(scope), params)
        .apply_all()?
        .into_query();

    let mut docs = T::store(services).find(query).await?;
    for doc in &mut docs {
        *doc = strip_hidden::<T>(std::mem::take(doc));
        T::expand(services, doc, ReadMode::List).await?;
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "results": docs.len(),
            "data": { "data": docs },
        })),
    )
        .into_response())
}

pub async fn get_one<T: Handled>(services: &AppServices, raw_id: &str) -> Result<Response, ApiError> {
    let id = T::parse_id(raw_id)?;
    let entity = T::store(services).find_by_id(id).await?.ok_or_else(ApiError::not_found)?;
    let mut doc = render(&entity)?;
    T::expand(services, &mut doc, ReadMode::Detail).await?;
    Ok(success(StatusCode::OK, doc))
}

/// Decode a client body into a new `T`; identity and bookkeeping fields are
/// assigned by the server.
pub fn new_entity<T: Resource>(body: Value) -> Result<T, ApiError> {
    let body = merge_patch(Value::Object(Map::new()), body)?;
    Ok(decode_input(body)?)
}

pub async fn create_one<T: Handled>(services: &AppServices, body: Value) -> Result<Response, ApiError> {
    let entity = T::store(services).insert(new_entity::<T>(body)?).await?;
    tracing::info!(collection = T::COLLECTION, id = %entity.id(), "created");
    settle(services, None, &entity).await;

    let mut doc = render(&entity)?;
    T::expand(services, &mut doc, ReadMode::Detail).await?;
    Ok(success(StatusCode::CREATED, doc))
}

pub async fn update_one<T: Handled>(services: &AppServices, raw_id: &str, patch: Value) -> Result<Response, ApiError> {
    let id = T::parse_id(raw_id)?;
    let store = T::store(services);
    let previous = store.find_by_id(id).await?.ok_or_else(ApiError::not_found)?;
    let entity = store.update_by_id(id, patch).await?.ok_or_else(ApiError::not_found)?;
    settle(services, Some(&previous), &entity).await;

    let mut doc = render(&entity)?;
    T::expand(services, &mut doc, ReadMode::Detail).await?;
    Ok(success(StatusCode::OK, doc))
}

pub async fn delete_one<T: Handled>(services: &AppServices, raw_id: &str) -> Result<Response, ApiError> {
    let id = T::parse_id(raw_id)?;
    let entity = T::store(services).delete_by_id(id).await?.ok_or_else(ApiError::not_found)?;
    tracing::info!(collection = T::COLLECTION, id = %entity.id(), "deleted");
    settle(services, None, &entity).await;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// -------------------------
// Entity hooks
// -------------------------

/// Public card of a user referenced from another document.
fn user_card(user: &User) -> Value {
    json!({ "id": user.id, "name": user.name, "photo": user.photo })
}

/// Public profile of a tour guide.
fn guide_profile(user: &User) -> Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "photo": user.photo,
        "role": user.role,
    })
}

type UserCache = HashMap<UserId, Option<Value>>;

/// Resolve `doc[field]` (one id or an array of ids) into user records.
///
/// Unknown or hidden users drop out of arrays and become `null` in place of
/// a single id.
async fn expand_users(
    services: &AppServices,
    doc: &mut Value,
    field: &str,
    present: fn(&User) -> Value,
    cache: &mut UserCache,
) -> Result<(), ApiError> {
    let Some(slot) = doc.get_mut(field) else {
        return Ok(());
    };

    match slot {
        Value::Array(items) => {
            let mut expanded = Vec::with_capacity(items.len());
            for item in items.iter() {
                if let Some(user) = resolve_user(services, item, present, cache).await? {
                    expanded.push(user);
                }
            }
            *items = expanded;
        }
        single => {
            *single = resolve_user(services, single, present, cache).await?.unwrap_or(Value::Null);
        }
    }
    Ok(())
}

async fn resolve_user(
    services: &AppServices,
    raw: &Value,
    present: fn(&User) -> Value,
    cache: &mut UserCache,
) -> Result<Option<Value>, ApiError> {
    let Some(id) = raw.as_str().and_then(|s| s.parse::<UserId>().ok()) else {
        return Ok(None);
    };
    if let Some(hit) = cache.get(&id) {
        return Ok(hit.clone());
    }
    let found = services.users.find_by_id(id).await?.map(|user| present(&user));
    cache.insert(id, found.clone());
    Ok(found)
}

#[async_trait]
impl Handled for Tour {
    fn store(services: &AppServices) -> &dyn EntityStore<Self> {
        services.tours.as_ref()
    }

    /// Guides on every read; reviews on a single tour.
    async fn expand(services: &AppServices, doc: &mut Value, mode: ReadMode) -> Result<(), ApiError> {
        expand_users(services, doc, "guides", guide_profile, &mut UserCache::new()).await?;

        if mode == ReadMode::Detail {
            let Some(id) = doc.get("id").and_then(Value::as_str).map(str::to_string) else {
                return Ok(());
            };
            let reviews = services.reviews.find_entities(Filter::new().eq("tour", id)).await?;
            let mut authors = UserCache::new();
            let mut rendered = Vec::with_capacity(reviews.len());
            for review in &reviews {
                let mut review_doc = render(review)?;
                expand_users(services, &mut review_doc, "user", user_card, &mut authors).await?;
                rendered.push(review_doc);
            }
            if let Value::Object(fields) = doc {
                fields.insert("reviews".to_string(), Value::Array(rendered));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Handled for Review {
    fn store(services: &AppServices) -> &dyn EntityStore<Self> {
        services.reviews.as_ref()
    }

    async fn expand(services: &AppServices, doc: &mut Value, _mode: ReadMode) -> Result<(), ApiError> {
        expand_users(services, doc, "user", user_card, &mut UserCache::new()).await
    }

    /// Recompute the rating summary of the reviewed tour, and of the tour
    /// the review was moved away from.
    async fn after_write(services: &AppServices, previous: Option<&Self>, review: &Self) -> Result<(), ApiError> {
        let moved_from = previous.and_then(|p| p.tour).filter(|tour| Some(*tour) != review.tour);
        for tour in review.tour.into_iter().chain(moved_from) {
            refresh_tour_rating(services, tour).await?;
        }
        Ok(())
    }
}

pub async fn refresh_tour_rating(services: &AppServices, tour: TourId) -> Result<(), ApiError> {
    let reviews = services
        .reviews
        .find_entities(Filter::new().eq("tour", tour.to_string()))
        .await?;
    let summary = RatingSummary::from_reviews(&reviews);
    let patch = serde_json::to_value(summary).map_err(|e| ApiError::Unknown(e.to_string()))?;

    match services.tours.update_by_id(tour, patch).await? {
        Some(_) => tracing::debug!(%tour, quantity = summary.ratings_quantity, average = summary.ratings_average, "tour rating refreshed"),
        None => tracing::warn!(%tour, "reviewed tour not found; rating not refreshed"),
    }
    Ok(())
}

#[async_trait]
impl Handled for User {
    fn store(services: &AppServices) -> &dyn EntityStore<Self> {
        services.users.as_ref()
    }
}

#[async_trait]
impl Handled for Booking {
    fn store(services: &AppServices) -> &dyn EntityStore<Self> {
        services.bookings.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourbook_core::DomainError;

    #[test]
    fn new_entities_ignore_client_identity() {
        let supplied = tourbook_core::ReviewId::new();
        let review: Review = new_entity(json!({
            "id": supplied,
            "__v": 9,
            "createdAt": "2001-01-01T00:00:00Z",
            "review": "Great",
        }))
        .unwrap();
        assert_ne!(review.id, supplied);
        assert!(review.created_at.timestamp() > 978_307_200);
    }

    #[test]
    fn malformed_bodies_are_validation_failures() {
        let err = new_entity::<Review>(json!({"rating": "five"})).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.starts_with("Invalid input data.")));

        let err = new_entity::<Review>(json!("text")).unwrap_err();
        let expected: ApiError = DomainError::validation("Update body must be a JSON object").into();
        assert_eq!(err.to_string(), expected.to_string());
    }

    #[test]
    fn rendering_drops_hidden_fields() {
        let user = User::register(
            tourbook_auth::NewUser {
                name: "Leo".to_string(),
                email: "leo@example.com".to_string(),
                password: "pass1234".to_string(),
                password_confirm: "pass1234".to_string(),
            },
            chrono::Utc::now(),
        )
        .unwrap();
        let doc = render(&user).unwrap();
        assert!(doc.get("password").is_none());
        assert!(doc.get("active").is_none());
        assert_eq!(doc["email"], "leo@example.com");
    }
}
