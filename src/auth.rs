use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    cookie::{AUTH_COOKIE, LOGGED_OUT, extract_cookie},
    error::{AppError, AppResult},
    models::{LoginRequest, NewUser, Role, SignupRequest, User},
    password::PasswordHasher,
    repository::{Repository, RepositoryState},
    session::{SessionRecord, SessionStore},
    token::TokenService,
    users::{normalize_email, validate_name, validate_password},
};

/// AuthUser Extractor Result
///
/// The resolved identity of a request. Handlers take this as an argument to learn
/// who is calling; role checks read `role`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// bearer_or_cookie
///
/// A non-blank `Authorization: Bearer` token takes precedence over the `jwt`
/// cookie. The logout sentinel counts as no token at all.
pub fn bearer_or_cookie(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer
        .or_else(|| extract_cookie(headers, AUTH_COOKIE))
        .filter(|token| !token.is_empty() && token != LOGGED_OUT)
}

/// resolve_identity
///
/// Verifies the token, then re-reads the user so deleted accounts and tokens
/// older than the last password change are rejected.
pub async fn resolve_identity(
    repo: &dyn Repository,
    tokens: &TokenService,
    token: &str,
) -> AppResult<AuthUser> {
    let claims = tokens.verify(token)?;

    let user = repo.get_user(claims.sub).await?.ok_or(AppError::UserGone)?;

    if user.changed_password_after(claims.iat as i64) {
        return Err(AppError::PasswordChanged);
    }

    Ok(AuthUser::from(&user))
}

/// AuthUser Extractor Implementation
///
/// Hard gate. Reuses an identity already bound by `protect` or the session guard;
/// otherwise resolves one from the request's token.
///
/// Rejection: `Unauthenticated` (no token), `InvalidToken`, `UserGone` or
/// `PasswordChanged`, all 401.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_or_cookie(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let repo = RepositoryState::from_ref(state);
        let tokens = TokenService::from_ref(state);
        resolve_identity(repo.as_ref(), &tokens, &token).await
    }
}

/// MaybeUser
///
/// Soft gate: the same resolution as `AuthUser`, but any failure yields `None`
/// instead of rejecting the request.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}

/// protect
///
/// Route-layer middleware. Resolving `AuthUser` rejects unauthenticated requests
/// before the handler runs; on success the identity is bound to the request so
/// downstream layers (`require_role`) and handlers see it.
pub async fn protect(user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(user);
    next.run(request).await
}

// --- Signup / Login ---

/// signup
///
/// Creates a `user`-role account. The returned record never serializes its hash.
pub async fn signup(
    repo: &dyn Repository,
    hasher: &PasswordHasher,
    req: SignupRequest,
) -> AppResult<User> {
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password, Some(&req.password_confirm))?;

    if repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let user = repo
        .create_user(NewUser {
            name,
            email,
            photo: None,
            role: Role::User,
            password_hash: hasher.hash(&req.password).await?,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user signed up");
    Ok(user)
}

/// LoginOutcome
///
/// Everything the login handler needs to set the `jwt` and `sid` cookies.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
    pub session_id: Uuid,
}

/// login
///
/// An unknown email and a wrong password fail identically. The `active` flag is
/// not consulted here.
pub async fn login(
    repo: &dyn Repository,
    hasher: &PasswordHasher,
    tokens: &TokenService,
    sessions: &dyn SessionStore,
    session_ttl: Duration,
    req: LoginRequest,
) -> AppResult<LoginOutcome> {
    let (Some(email), Some(password)) = (
        req.email.filter(|email| !email.trim().is_empty()),
        req.password.filter(|password| !password.is_empty()),
    ) else {
        return Err(AppError::MissingCredentials);
    };

    let email = email.trim().to_lowercase();
    let Some(user) = repo.find_user_by_email(&email).await? else {
        tracing::warn!("login attempt for unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !hasher.verify(&password, &user.password_hash).await? {
        tracing::warn!(user_id = %user.id, "login attempt with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let now = Utc::now();
    let token = tokens.issue(user.id, now)?;
    let session_id = sessions
        .create(SessionRecord {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            expires_at: now + session_ttl,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome {
        user,
        token,
        session_id,
    })
}
