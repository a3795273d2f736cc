use crate::error::StoreError;
use crate::features::{FilterValue, QueryDescriptor, Queryable};
use crate::models::{Loan, LoanPatch, NewLoan, NewUser, User, UserPatch};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, so handlers and
/// services work against `Arc<dyn Repository>` without knowing whether Postgres or
/// the in-memory store sits behind it.
///
/// Not-found is never an error here: lookups return `Option`, deletes return `bool`.
/// `Err` is reserved for rejected writes (`Duplicate`, `Validation`) and backend failure.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    // Exact match on the (already lower-cased) email. Inactive users are included.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_users(&self, query: &QueryDescriptor<User>) -> Result<Vec<User>, StoreError>;
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    // Partial update: only `Some` fields change.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError>;

    // --- Loans ---
    async fn find_loans(&self, query: &QueryDescriptor<Loan>) -> Result<Vec<Loan>, StoreError>;
    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError>;
    async fn create_loan(&self, loan: NewLoan) -> Result<Loan, StoreError>;
    // Partial update; always advances `modified_date`.
    async fn update_loan(&self, id: Uuid, patch: LoanPatch) -> Result<Option<Loan>, StoreError>;
    // Physical removal. Returns true if a row was deleted.
    async fn delete_loan(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

macro_rules! user_columns {
    () => {
        "id, name, email, photo, role, password_hash, password_changed_at, active, created_at"
    };
}

macro_rules! loan_columns {
    () => {
        "id, loan_type, name, loan_number, amount, interest_rate, loan_term_years, \
         start_date, created_date, modified_date, is_deleted"
    };
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// push_descriptor
///
/// Appends WHERE / ORDER BY / LIMIT / OFFSET for a query descriptor. Column names
/// come only from the record's static allow-list; every value is bound, never
/// interpolated.
fn push_descriptor<R: Queryable>(
    builder: &mut QueryBuilder<'_, Postgres>,
    descriptor: &QueryDescriptor<R>,
) {
    for (index, clause) in descriptor.filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        builder.push(clause.field.column);
        builder.push(" ");
        builder.push(clause.comparator.as_sql());
        builder.push(" ");
        match &clause.value {
            FilterValue::Text(v) => builder.push_bind(v.clone()),
            FilterValue::Integer(v) => builder.push_bind(*v),
            FilterValue::Number(v) => builder.push_bind(*v),
            FilterValue::Boolean(v) => builder.push_bind(*v),
            FilterValue::Timestamp(v) => builder.push_bind(*v),
            FilterValue::Uuid(v) => builder.push_bind(*v),
        };
    }

    for (index, key) in descriptor.sort.iter().enumerate() {
        builder.push(if index == 0 { " ORDER BY " } else { ", " });
        builder.push(key.field.column);
        builder.push(" ");
        builder.push(key.direction.as_sql());
    }

    builder.push(" LIMIT ");
    builder.push_bind(i64::from(descriptor.limit));
    builder.push(" OFFSET ");
    builder.push_bind(i64::try_from(descriptor.skip()).unwrap_or(i64::MAX));
}

/// Translates driver errors into store outcomes. Unique and check violations are
/// client-caused; everything else is logged as a backend failure.
fn store_error(context: &'static str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(name) if name.contains("email") => "email",
                _ => "id",
            };
            return StoreError::Duplicate { field };
        }
        if db.is_check_violation() {
            return StoreError::Validation(db.message().to_string());
        }
    }

    tracing::error!(error = ?err, "{context} failed");
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("find_user_by_email", e))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_user", e))
    }

    /// find_users
    ///
    /// Descriptor-driven listing built with QueryBuilder for safe parameterization.
    async fn find_users(&self, query: &QueryDescriptor<User>) -> Result<Vec<User>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(concat!("SELECT ", user_columns!(), " FROM users"));
        push_descriptor(&mut builder, query);

        builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("find_users", e))
    }

    /// create_user
    ///
    /// Inserts an active user. `password_changed_at` and `created_at` take the
    /// application clock, the same clock that stamps token `iat`.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(concat!(
            "INSERT INTO users (id, name, email, photo, role, password_hash, password_changed_at, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, true, $7) RETURNING ",
            user_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(user.name)
        .bind(user.email)
        .bind(user.photo)
        .bind(user.role.as_str())
        .bind(user.password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create_user", e))
    }

    /// update_user
    ///
    /// Uses `COALESCE` so a `None` field in the patch leaves the column untouched.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(concat!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                photo = COALESCE($4, photo),
                role = COALESCE($5, role),
                active = COALESCE($6, active),
                password_hash = COALESCE($7, password_hash),
                password_changed_at = COALESCE($8, password_changed_at)
            WHERE id = $1
            RETURNING "#,
            user_columns!()
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.photo)
        .bind(patch.role.map(|role| role.as_str()))
        .bind(patch.active)
        .bind(patch.password_hash)
        .bind(patch.password_changed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("update_user", e))
    }

    async fn find_loans(&self, query: &QueryDescriptor<Loan>) -> Result<Vec<Loan>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(concat!("SELECT ", loan_columns!(), " FROM loans"));
        push_descriptor(&mut builder, query);

        builder
            .build_query_as::<Loan>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("find_loans", e))
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError> {
        sqlx::query_as::<_, Loan>(concat!(
            "SELECT ",
            loan_columns!(),
            " FROM loans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("get_loan", e))
    }

    async fn create_loan(&self, loan: NewLoan) -> Result<Loan, StoreError> {
        sqlx::query_as::<_, Loan>(concat!(
            "INSERT INTO loans (id, loan_type, name, loan_number, amount, interest_rate, loan_term_years, \
             start_date, created_date, modified_date, is_deleted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW(), false) RETURNING ",
            loan_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(loan.loan_type.as_str())
        .bind(loan.name)
        .bind(loan.loan_number)
        .bind(loan.amount)
        .bind(loan.interest_rate)
        .bind(loan.loan_term_years)
        .bind(loan.start_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("create_loan", e))
    }

    async fn update_loan(&self, id: Uuid, patch: LoanPatch) -> Result<Option<Loan>, StoreError> {
        sqlx::query_as::<_, Loan>(concat!(
            r#"
            UPDATE loans
            SET loan_type = COALESCE($2, loan_type),
                name = COALESCE($3, name),
                loan_number = COALESCE($4, loan_number),
                amount = COALESCE($5, amount),
                interest_rate = COALESCE($6, interest_rate),
                loan_term_years = COALESCE($7, loan_term_years),
                start_date = COALESCE($8, start_date),
                is_deleted = COALESCE($9, is_deleted),
                modified_date = NOW()
            WHERE id = $1
            RETURNING "#,
            loan_columns!()
        ))
        .bind(id)
        .bind(patch.loan_type.map(|loan_type| loan_type.as_str()))
        .bind(patch.name)
        .bind(patch.loan_number)
        .bind(patch.amount)
        .bind(patch.interest_rate)
        .bind(patch.loan_term_years)
        .bind(patch.start_date)
        .bind(patch.is_deleted)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("update_loan", e))
    }

    async fn delete_loan(&self, id: Uuid) -> Result<bool, StoreError> {
        sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(|e| store_error("delete_loan", e))
    }
}
