use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any resolved identity, whatever its role. The `protect` layer is
/// applied by `create_router`; handlers receive the caller through `AuthUser`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/DELETE /users/me
        // The caller's own profile; DELETE deactivates it.
        .route("/users/me", get(handlers::get_me).delete(handlers::delete_me))
        // GET /loans/my?name=
        // Loans owned by `name` (the caller's name by default).
        .route("/loans/my", get(handlers::my_loans))
        // POST /loans
        .route("/loans", post(handlers::create_loan))
        // GET /loans/{id}
        // Single loan with its calculated payment.
        .route("/loans/{id}", get(handlers::get_loan))
}
