use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod cookie;
pub mod error;
pub mod extract;
pub mod features;
pub mod guard;
pub mod handlers;
pub mod loans;
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;
pub mod session;
pub mod token;
pub mod users;
pub mod views;

// Module for routing segregation (Public, Authenticated, Admin, Views).
pub mod routes;
use routes::{admin, authenticated, public, views as view_routes};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use memory::InMemoryRepository;
pub use password::PasswordHasher;
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{InMemorySessionStore, SessionState};
pub use token::TokenService;

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json` and
/// browsable through Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signup, handlers::login, handlers::logout,
        handlers::get_me, handlers::delete_me,
        handlers::list_users, handlers::create_user, handlers::get_user,
        handlers::update_user, handlers::delete_user,
        handlers::list_loans, handlers::my_loans, handlers::create_loan,
        handlers::get_loan, handlers::update_loan, handlers::delete_loan,
    ),
    components(
        schemas(
            models::User, models::Role, models::Loan, models::LoanType, models::LoanListing,
            models::SignupRequest, models::LoginRequest, models::CreateUserRequest,
            models::UpdateUserRequest, models::CreateLoanRequest, models::UpdateLoanRequest,
            handlers::UserData, handlers::LoanData,
        )
    ),
    tags(
        (name = "loan-portal", description = "Loan management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single cloneable container of every shared service. Extractors and
/// middleware pull individual components out of it through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Record store: Postgres in deployments, in-memory locally and in tests.
    pub repo: RepositoryState,
    /// Server-side sessions referenced by the `sid` cookie.
    pub sessions: SessionState,
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires token and hashing services from the configuration.
    pub fn new(repo: RepositoryState, sessions: SessionState, config: AppConfig) -> Self {
        Self {
            repo,
            sessions,
            tokens: TokenService::from_config(&config),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, applies the access layers and the
/// observability stack, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router: public routes bare, everything else behind `protect`.
    // Role layers inside `admin_routes` run after `protect` has bound the caller.
    let api = public::public_routes().merge(
        authenticated::authenticated_routes()
            .merge(admin::admin_routes())
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::protect,
            )),
    );

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .merge(view_routes::view_routes(state.clone()))
        // Outside production, error bodies gain the internal detail.
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            error::expose_error_detail,
        ))
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the `http_request` span with method, URI and the `x-request-id`, so every
/// log line of one request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
