use crate::{
    AppState,
    auth::{self, AuthUser},
    cookie::{self, AUTH_COOKIE, CookieConfig, SESSION_COOKIE, extract_cookie},
    error::AppResult,
    extract::{AppJson, AppPath},
    loans,
    models::{
        ApiResponse, CreateLoanRequest, CreateUserRequest, LoanListing, LoginRequest,
        SignupRequest, UpdateLoanRequest, UpdateUserRequest, User,
    },
    users,
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// --- Query & Response Shapes ---

/// ListParams
///
/// The reserved parameters every list endpoint understands. Any other key is a
/// field filter, optionally with a bracket operator: `amount[gte]=1000`.
#[derive(Deserialize, IntoParams)]
pub struct ListParams {
    /// 1-based page number (default 1).
    pub page: Option<String>,
    /// Page size (default 100).
    pub limit: Option<String>,
    /// Comma-separated fields, `-` prefix for descending: `-amount,name`.
    pub sort: Option<String>,
    /// Comma-separated fields to return.
    pub fields: Option<String>,
}

/// Raw query pairs, in request order.
pub type RawParams = Query<Vec<(String, String)>>;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserData {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoanData {
    pub loan: LoanListing,
}

// --- Auth ---

/// signup
///
/// [Public Route] Registers a `user`-role account. The response omits the password hash.
#[utoipa::path(
    post,
    path = "/api/v1/users/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created", body = UserData),
        (status = 400, description = "Invalid input or email already in use")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserData>>)> {
    let user = auth::signup(state.repo.as_ref(), &state.hasher, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserData { user })),
    ))
}

/// login
///
/// [Public Route] Verifies credentials, sets the `jwt` and `sid` cookies and
/// redirects to `/`.
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    request_body = LoginRequest,
    responses(
        (status = 302, description = "Logged in; cookies set"),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Incorrect email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let outcome = auth::login(
        state.repo.as_ref(),
        &state.hasher,
        &state.tokens,
        state.sessions.as_ref(),
        Duration::days(state.config.jwt_cookie_expires_in_days),
        payload,
    )
    .await?;

    let now = Utc::now();
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_static("/"));
    headers.append(
        header::SET_COOKIE,
        CookieConfig::from_config(AUTH_COOKIE, &state.config).header_value(&outcome.token, now)?,
    );
    headers.append(
        header::SET_COOKIE,
        CookieConfig::from_config(SESSION_COOKIE, &state.config)
            .header_value(&outcome.session_id.to_string(), now)?,
    );

    Ok((StatusCode::FOUND, headers).into_response())
}

/// logout
///
/// [Public Route] Overwrites the auth cookie and destroys the session, if any.
/// Safe to call repeatedly.
#[utoipa::path(
    get,
    path = "/api/v1/users/logout",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    end_session(&state, &headers).await?;

    let mut response = Json(json!({ "status": "success" })).into_response();
    append_logout_cookies(&state, response.headers_mut())?;
    Ok(response)
}

pub(crate) async fn end_session(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    if let Some(session_id) =
        extract_cookie(headers, SESSION_COOKIE).and_then(|raw| Uuid::parse_str(&raw).ok())
    {
        if state.sessions.destroy(session_id).await? {
            tracing::info!(%session_id, "session destroyed");
        }
    }
    Ok(())
}

pub(crate) fn append_logout_cookies(state: &AppState, headers: &mut HeaderMap) -> AppResult<()> {
    let now = Utc::now();
    headers.append(
        header::SET_COOKIE,
        cookie::logged_out_cookie(&state.config, now)?,
    );
    headers.append(
        header::SET_COOKIE,
        cookie::cleared_session_cookie(&state.config, now)?,
    );
    Ok(())
}

// --- Current User ---

/// get_me
///
/// [Authenticated Route] Profile of the caller resolved from the bearer token or cookie.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses((status = 200, description = "Current user", body = UserData))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let user = users::get_user(state.repo.as_ref(), id).await?;
    Ok(Json(ApiResponse::success(UserData { user })))
}

/// delete_me
///
/// [Authenticated Route] Deactivates the caller's own account (soft delete).
#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    responses((status = 204, description = "Account deactivated"))
)]
pub async fn delete_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<StatusCode> {
    users::deactivate_user(state.repo.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- User Administration ---

/// list_users
///
/// [Admin Route] Lists users through the query pipeline.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListParams),
    responses(
        (status = 200, description = "Users", body = [User]),
        (status = 400, description = "Unknown filter field or bad value"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<ApiResponse<Vec<Value>>>> {
    let users = users::list_users(state.repo.as_ref(), &params).await?;
    Ok(Json(ApiResponse::list(users)))
}

/// create_user
///
/// [Admin Route] Creates an account with an explicit role.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserData),
        (status = 400, description = "Invalid input or email already in use")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserData>>)> {
    let user = users::create_user(state.repo.as_ref(), &state.hasher, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserData { user })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserData),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let user = users::get_user(state.repo.as_ref(), id).await?;
    Ok(Json(ApiResponse::success(UserData { user })))
}

/// update_user
///
/// [Admin Route] Partial update. Supplying `password` re-hashes it and
/// invalidates the user's existing tokens.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserData),
        (status = 404, description = "No such user")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<UserData>>> {
    let user = users::update_user(state.repo.as_ref(), &state.hasher, id, payload).await?;
    Ok(Json(ApiResponse::success(UserData { user })))
}

/// delete_user
///
/// [Admin Route] Soft delete: marks the account inactive.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deactivated"),
        (status = 404, description = "No such user")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    users::deactivate_user(state.repo.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Loans ---

/// list_loans
///
/// [Staff/Admin Route] Lists loans through the query pipeline, each augmented
/// with `calculatedLoanAmount`.
#[utoipa::path(
    get,
    path = "/api/v1/loans",
    params(ListParams),
    responses(
        (status = 200, description = "Loans", body = [LoanListing]),
        (status = 400, description = "Unknown filter field or bad value"),
        (status = 403, description = "Role not permitted")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<ApiResponse<Vec<Value>>>> {
    let loans = loans::list_loans(state.repo.as_ref(), &params).await?;
    Ok(Json(ApiResponse::list(loans)))
}

/// my_loans
///
/// [Authenticated Route] Loans whose owner name matches `?name=`, defaulting to
/// the caller's name. Accepts the same list parameters as `/loans`.
#[utoipa::path(
    get,
    path = "/api/v1/loans/my",
    params(ListParams, ("name" = Option<String>, Query, description = "Owner name")),
    responses((status = 200, description = "Matching loans", body = [LoanListing]))
)]
pub async fn my_loans(
    AuthUser { name, .. }: AuthUser,
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<ApiResponse<Vec<Value>>>> {
    let loans = loans::list_my_loans(state.repo.as_ref(), &params, &name).await?;
    Ok(Json(ApiResponse::list(loans)))
}

#[utoipa::path(
    post,
    path = "/api/v1/loans",
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanData),
        (status = 400, description = "Invalid loan")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<LoanData>>)> {
    let loan = loans::create_loan(state.repo.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(LoanData { loan })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/loans/{id}",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 200, description = "Loan", body = LoanData),
        (status = 404, description = "No such loan")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<LoanData>>> {
    let loan = loans::get_loan(state.repo.as_ref(), id).await?;
    Ok(Json(ApiResponse::success(LoanData { loan })))
}

/// update_loan
///
/// [Staff/Admin Route] Partial update; advances `modifiedDate`.
#[utoipa::path(
    patch,
    path = "/api/v1/loans/{id}",
    params(("id" = Uuid, Path, description = "Loan id")),
    request_body = UpdateLoanRequest,
    responses(
        (status = 200, description = "Updated loan", body = LoanData),
        (status = 404, description = "No such loan")
    )
)]
pub async fn update_loan(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateLoanRequest>,
) -> AppResult<Json<ApiResponse<LoanData>>> {
    let loan = loans::update_loan(state.repo.as_ref(), id, payload).await?;
    Ok(Json(ApiResponse::success(LoanData { loan })))
}

/// delete_loan
///
/// [Staff/Admin Route] Removes the loan record permanently.
#[utoipa::path(
    delete,
    path = "/api/v1/loans/{id}",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such loan")
    )
)]
pub async fn delete_loan(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    loans::delete_loan(state.repo.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
