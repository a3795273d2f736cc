use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    cookie::{SESSION_COOKIE, extract_cookie},
    error::AppError,
    models::Role,
    repository::RepositoryState,
    session::SessionState,
};

/// require_authenticated
///
/// Session gate for the view routes. Admits the request only when the `sid`
/// cookie names a live server-side session whose user still exists, and binds
/// that user as the request's `AuthUser`.
pub async fn require_authenticated(
    State(sessions): State<SessionState>,
    State(repo): State<RepositoryState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session_id = extract_cookie(request.headers(), SESSION_COOKIE)
        .and_then(|raw| Uuid::parse_str(&raw).ok())
        .ok_or(AppError::Unauthenticated)?;

    let session = sessions
        .get(session_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    // Role and name are re-read so changes since login take effect.
    let user = repo
        .get_user(session.user_id)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    request.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(request).await)
}

/// AllowedRoles
///
/// The role set a `require_role` layer admits. Built from a single role, an
/// array of roles, or a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllowedRoles(u8);

impl AllowedRoles {
    fn bit(role: Role) -> u8 {
        match role {
            Role::User => 0b001,
            Role::Staff => 0b010,
            Role::Admin => 0b100,
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & Self::bit(role) != 0
    }
}

impl From<Role> for AllowedRoles {
    fn from(role: Role) -> Self {
        AllowedRoles(Self::bit(role))
    }
}

impl From<&[Role]> for AllowedRoles {
    fn from(roles: &[Role]) -> Self {
        AllowedRoles(roles.iter().fold(0, |mask, role| mask | Self::bit(*role)))
    }
}

impl<const N: usize> From<[Role; N]> for AllowedRoles {
    fn from(roles: [Role; N]) -> Self {
        Self::from(roles.as_slice())
    }
}

/// require_role
///
/// Applied with `from_fn_with_state(AllowedRoles::from(..), require_role)`. Must
/// sit inside an identity layer (`protect` or `require_authenticated`); with no
/// bound identity it fails closed.
pub async fn require_role(
    State(allowed): State<AllowedRoles>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match request.extensions().get::<AuthUser>() {
        Some(user) if allowed.contains(user.role) => Ok(next.run(request).await),
        Some(user) => {
            tracing::warn!(user_id = %user.id, role = user.role.as_str(), "role not permitted");
            Err(AppError::Forbidden)
        }
        None => {
            tracing::warn!("role check reached without a resolved identity");
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_role_admits_only_itself() {
        let allowed = AllowedRoles::from(Role::Admin);
        assert!(allowed.contains(Role::Admin));
        assert!(!allowed.contains(Role::Staff));
        assert!(!allowed.contains(Role::User));
    }

    #[test]
    fn role_set_admits_each_member() {
        let allowed = AllowedRoles::from([Role::Admin, Role::Staff]);
        assert!(allowed.contains(Role::Admin));
        assert!(allowed.contains(Role::Staff));
        assert!(!allowed.contains(Role::User));
    }

    #[test]
    fn empty_set_admits_nobody() {
        let none: &[Role] = &[];
        let allowed = AllowedRoles::from(none);
        assert!(!allowed.contains(Role::Admin));
    }
}
