use crate::{
    AppState,
    guard::{AllowedRoles, require_authenticated, require_role},
    models::Role,
    views,
};
use axum::{Router, middleware, routing::get};

/// View Router Module
///
/// Page routes at the root. Gated pages require a live session; role-gated pages
/// add `require_role` underneath it. Layers added later run first, so the
/// session check is always added last.
pub fn view_routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/", get(views::home))
        .route("/login", get(views::login_form))
        .route("/signup", get(views::signup_form))
        .route("/logout", get(views::logout));

    let signed_in = Router::new()
        .route("/newLoan", get(views::new_loan))
        .route("/myLoanLists", get(views::my_loans));

    let staff = Router::new()
        .route("/allloanlists", get(views::all_loans))
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles::from([Role::Admin, Role::Staff]),
            require_role,
        ));

    let admin = Router::new()
        .route("/alluserlists", get(views::all_users))
        .route_layer(middleware::from_fn_with_state(
            AllowedRoles::from(Role::Admin),
            require_role,
        ));

    open.merge(
        signed_in
            .merge(staff)
            .merge(admin)
            .route_layer(middleware::from_fn_with_state(state, require_authenticated)),
    )
}
