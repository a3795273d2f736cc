//! Page endpoints. Each returns the context a template renderer needs as JSON;
//! rendering itself happens outside this service.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    AppState,
    auth::{AuthUser, MaybeUser},
    error::AppResult,
    handlers::{RawParams, append_logout_cookies, end_session},
    loans,
    models::Role,
    users,
};

/// PageContext
///
/// Title plus whatever the page shows: the caller's name and role when signed
/// in, and the record list for listing pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContext {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loans: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<Value>>,
}

impl PageContext {
    fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    fn for_user(title: &str, user: &AuthUser) -> Self {
        Self {
            title: title.to_string(),
            name: Some(user.name.clone()),
            role: Some(user.role),
            ..Self::default()
        }
    }
}

pub async fn home(MaybeUser(user): MaybeUser) -> Json<PageContext> {
    Json(match user {
        Some(user) => PageContext::for_user("Over View", &user),
        None => PageContext::titled("Over View"),
    })
}

pub async fn login_form() -> Json<PageContext> {
    Json(PageContext::titled("Log into your account"))
}

pub async fn signup_form() -> Json<PageContext> {
    Json(PageContext::titled("Sign in New User"))
}

pub async fn new_loan(user: AuthUser) -> Json<PageContext> {
    Json(PageContext::for_user("Create New Loan", &user))
}

pub async fn all_loans(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<PageContext>> {
    let loans = loans::list_loans(state.repo.as_ref(), &params).await?;
    Ok(Json(PageContext {
        loans: Some(loans),
        ..PageContext::for_user("Get Loan Lists", &user)
    }))
}

pub async fn my_loans(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<PageContext>> {
    let loans = loans::list_my_loans(state.repo.as_ref(), &params, &user.name).await?;
    Ok(Json(PageContext {
        loans: Some(loans),
        ..PageContext::for_user("Get Loan Lists", &user)
    }))
}

pub async fn all_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): RawParams,
) -> AppResult<Json<PageContext>> {
    let users = users::list_users(state.repo.as_ref(), &params).await?;
    Ok(Json(PageContext {
        users: Some(users),
        ..PageContext::for_user("Get User Lists", &user)
    }))
}

/// Destroys the session, clears both cookies and redirects home.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    end_session(&state, &headers).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::LOCATION, HeaderValue::from_static("/"));
    append_logout_cookies(&state, &mut response_headers)?;

    Ok((StatusCode::FOUND, response_headers).into_response())
}
