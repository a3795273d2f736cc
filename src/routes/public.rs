use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without any identity, nested under `/api/v1`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /users/signup
        // Creates a `user`-role account; 400 on a duplicate email.
        .route("/users/signup", post(handlers::signup))
        // POST /users/login
        // Sets the `jwt` and `sid` cookies and redirects to `/`.
        .route("/users/login", post(handlers::login))
        // GET /users/logout
        // Idempotent; overwrites the auth cookie.
        .route("/users/logout", get(handlers::logout))
}
