use crate::{
    AppState,
    guard::{AllowedRoles, require_role},
    handlers,
    models::Role,
};
use axum::{
    Router,
    middleware,
    routing::{get, patch},
};

/// Admin Router Module
///
/// Role-restricted routes. `create_router` wraps this router in `protect`, so the
/// identity is bound before any `require_role` layer here runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new().merge(staff_routes()).merge(user_admin_routes())
}

/// Loan management: admin or staff.
fn staff_routes() -> Router<AppState> {
    Router::new()
        // GET /loans
        // Full listing with filter/sort/fields/pagination parameters.
        .route("/loans", get(handlers::list_loans))
        // PATCH/DELETE /loans/{id}
        .route(
            "/loans/{id}",
            patch(handlers::update_loan).delete(handlers::delete_loan),
        )
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles::from([Role::Admin, Role::Staff]),
            require_role,
        ))
}

/// User CRUD: admin only.
fn user_admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .patch(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles::from(Role::Admin),
            require_role,
        ))
}
