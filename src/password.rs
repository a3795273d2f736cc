use crate::error::{AppError, AppResult};

/// PasswordHasher
///
/// Salted bcrypt hashing. Both operations run on the blocking pool since a
/// single hash at cost 10 takes tens of milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plain: &str) -> AppResult<String> {
        let plain = plain.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("bcrypt hash failed: {e}")))
    }

    /// A malformed stored hash verifies as `false` rather than erroring, so
    /// login keeps a single failure path.
    pub async fn verify(&self, plain: &str, hash: &str) -> AppResult<bool> {
        let plain = plain.to_owned();
        let hash = hash.to_owned();

        let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?;

        Ok(outcome.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            false
        }))
    }
}
