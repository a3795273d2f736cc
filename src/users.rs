//! User record service: validation plus CRUD over the repository.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    features::QueryDescriptor,
    models::{CreateUserRequest, NewUser, UpdateUserRequest, User, UserPatch},
    password::PasswordHasher,
    repository::Repository,
};

pub const MIN_PASSWORD_LEN: usize = 8;

// --- Validation ---

/// Trims and lower-cases an email; rejects anything without an `@`.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AppError::Validation("Please provide a valid email".into())),
    }
}

pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Please tell us your name".into()));
    }
    Ok(name.to_string())
}

/// `confirm` is checked only when supplied.
pub fn validate_password(password: &str, confirm: Option<&str>) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if confirm.is_some_and(|confirm| confirm != password) {
        return Err(AppError::Validation(
            "The password confirmation did not match".into(),
        ));
    }
    Ok(())
}

// --- Operations ---

/// Lists users through the query pipeline and shapes each record per the projection.
pub async fn list_users(repo: &dyn Repository, params: &[(String, String)]) -> AppResult<Vec<Value>> {
    let descriptor = QueryDescriptor::<User>::from_params(params)?;
    let users = repo.find_users(&descriptor).await?;

    users
        .iter()
        .map(|user| {
            serde_json::to_value(user)
                .map(|document| descriptor.projection.apply(document))
                .map_err(|e| AppError::Internal(format!("user serialization failed: {e}")))
        })
        .collect()
}

pub async fn get_user(repo: &dyn Repository, id: Uuid) -> AppResult<User> {
    repo.get_user(id).await?.ok_or(AppError::NotFound("User"))
}

/// Admin-side creation. The role may be chosen; it defaults to `user`.
pub async fn create_user(
    repo: &dyn Repository,
    hasher: &PasswordHasher,
    req: CreateUserRequest,
) -> AppResult<User> {
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password, req.password_confirm.as_deref())?;

    if repo.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let user = repo
        .create_user(NewUser {
            name,
            email,
            photo: req.photo,
            role: req.role.unwrap_or_default(),
            password_hash: hasher.hash(&req.password).await?,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created by admin");
    Ok(user)
}

/// Partial update. A new password is re-hashed and advances `passwordChangedAt`,
/// which revokes every token issued before it.
pub async fn update_user(
    repo: &dyn Repository,
    hasher: &PasswordHasher,
    id: Uuid,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let mut patch = UserPatch {
        name: req.name.as_deref().map(validate_name).transpose()?,
        email: req.email.as_deref().map(normalize_email).transpose()?,
        photo: req.photo,
        role: req.role,
        active: req.active,
        ..UserPatch::default()
    };

    if let Some(password) = req.password {
        validate_password(&password, req.password_confirm.as_deref())?;
        patch.password_hash = Some(hasher.hash(&password).await?);
        patch.password_changed_at = Some(Utc::now());
    }

    repo.update_user(id, patch)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Soft delete: the record stays, marked `active = false`.
pub async fn deactivate_user(repo: &dyn Repository, id: Uuid) -> AppResult<()> {
    let patch = UserPatch {
        active: Some(false),
        ..UserPatch::default()
    };

    match repo.update_user(id, patch).await? {
        Some(_) => {
            tracing::info!(user_id = %id, "user deactivated");
            Ok(())
        }
        None => Err(AppError::NotFound("User")),
    }
}
