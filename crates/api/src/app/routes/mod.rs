use axum::{Router, middleware::from_fn_with_state, routing::MethodRouter};

use crate::middleware::{self, AuthState};

pub mod bookings;
pub mod reviews;
pub mod system;
pub mod tours;
pub mod users;

/// Router for everything under `/api/v1`.
pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .nest("/tours", tours::router(auth))
        .nest("/users", users::router(auth))
        .nest("/reviews", reviews::router(auth))
        .nest("/bookings", bookings::router(auth))
}

/// Put one method router behind authentication.
pub(crate) fn guarded(auth: &AuthState, route: MethodRouter) -> MethodRouter {
    route.route_layer(from_fn_with_state(auth.clone(), middleware::protect))
}

/// Put every route registered so far on `router` behind authentication.
pub(crate) fn protected(auth: &AuthState, router: Router) -> Router {
    router.route_layer(from_fn_with_state(auth.clone(), middleware::protect))
}
