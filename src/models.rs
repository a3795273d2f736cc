use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::features::{FieldKind, FieldSpec, Queryable, SortDirection};

// --- Enumerations ---

/// Raised when a stored or submitted enum label is not recognised.
#[derive(Debug, Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

/// Role
///
/// The RBAC level of a user account. New accounts default to `user`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

/// LoanType
///
/// Product line of a loan record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[ts(export)]
pub enum LoanType {
    #[default]
    Home,
    Auto,
    Boat,
    Life,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::Home => "Home",
            LoanType::Auto => "Auto",
            LoanType::Boat => "Boat",
            LoanType::Life => "Life",
        }
    }
}

impl TryFrom<String> for LoanType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Home" => Ok(LoanType::Home),
            "Auto" => Ok(LoanType::Auto),
            "Boat" => Ok(LoanType::Boat),
            "Life" => Ok(LoanType::Life),
            _ => Err(UnknownVariant {
                kind: "loan type",
                value,
            }),
        }
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// An account in the `users` table. The bcrypt hash is loaded for credential
/// checks but is never serialized to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    // Stored lower-cased; uniqueness is enforced by the store.
    pub email: String,
    pub photo: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: String,
    #[ts(type = "string")]
    pub password_changed_at: DateTime<Utc>,
    // Soft-delete marker.
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl User {
    /// True when the password changed after a token issued at `issued_at`
    /// (seconds since the epoch) was minted.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        issued_at < self.password_changed_at.timestamp()
    }
}

/// Loan
///
/// A loan record from the `loans` table. The amortized payment is not stored;
/// see [`LoanListing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Loan {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub loan_type: LoanType,
    // Owner display name; `GET /loans/my` matches against this field.
    pub name: String,
    pub loan_number: Option<i64>,
    pub amount: f64,
    pub interest_rate: f64,
    pub loan_term_years: i32,
    pub start_date: Option<String>,
    #[ts(type = "string")]
    pub created_date: DateTime<Utc>,
    #[ts(type = "string")]
    pub modified_date: DateTime<Utc>,
    pub is_deleted: bool,
}

/// LoanListing
///
/// A loan as returned to clients, carrying the payment amount recomputed at
/// read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoanListing {
    #[serde(flatten)]
    pub loan: Loan,
    pub calculated_loan_amount: f64,
}

// --- Query allow-lists ---

impl Queryable for User {
    const RESOURCE: &'static str = "User";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("id", "id", FieldKind::Uuid),
        FieldSpec::new("name", "name", FieldKind::Text),
        FieldSpec::new("email", "email", FieldKind::Text),
        FieldSpec::new("photo", "photo", FieldKind::Text),
        FieldSpec::new("role", "role", FieldKind::Text),
        FieldSpec::new("passwordChangedAt", "password_changed_at", FieldKind::Timestamp),
        FieldSpec::new("active", "active", FieldKind::Boolean),
        FieldSpec::new("createdAt", "created_at", FieldKind::Timestamp),
    ];
    const DEFAULT_SORT: (&'static str, SortDirection) = ("createdAt", SortDirection::Descending);
    const INTERNAL_FIELDS: &'static [&'static str] = &["active"];
}

impl Queryable for Loan {
    const RESOURCE: &'static str = "Loan";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("id", "id", FieldKind::Uuid),
        FieldSpec::new("loanType", "loan_type", FieldKind::Text),
        FieldSpec::new("name", "name", FieldKind::Text),
        FieldSpec::new("loanNumber", "loan_number", FieldKind::Integer),
        FieldSpec::new("amount", "amount", FieldKind::Number),
        FieldSpec::new("interestRate", "interest_rate", FieldKind::Number),
        FieldSpec::new("loanTermYears", "loan_term_years", FieldKind::Integer),
        FieldSpec::new("startDate", "start_date", FieldKind::Text),
        FieldSpec::new("createdDate", "created_date", FieldKind::Timestamp),
        FieldSpec::new("modifiedDate", "modified_date", FieldKind::Timestamp),
        FieldSpec::new("isDeleted", "is_deleted", FieldKind::Boolean),
    ];
    const DEFAULT_SORT: (&'static str, SortDirection) =
        ("createdDate", SortDirection::Descending);
    const INTERNAL_FIELDS: &'static [&'static str] = &[];
}

// --- Store Inputs (validated, internal) ---

/// A user ready to be inserted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

/// Partial user update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub password_hash: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewLoan {
    pub loan_type: LoanType,
    pub name: String,
    pub loan_number: Option<i64>,
    pub amount: f64,
    pub interest_rate: f64,
    pub loan_term_years: i32,
    pub start_date: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoanPatch {
    pub loan_type: Option<LoanType>,
    pub name: Option<String>,
    pub loan_number: Option<i64>,
    pub amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub loan_term_years: Option<i32>,
    pub start_date: Option<String>,
    pub is_deleted: Option<bool>,
}

// --- Request Payloads (Input Schemas) ---

/// SignupRequest
///
/// Body of `POST /users/signup`. Missing fields deserialize as empty strings
/// and are rejected by validation with a readable message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// CreateUserRequest
///
/// Admin-side account creation. Unlike signup, the role may be chosen.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub password_confirm: Option<String>,
    pub role: Option<Role>,
    pub photo: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update payload for `PATCH /users/{id}`. Supplying `password`
/// re-hashes it and advances `passwordChangedAt`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_confirm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateLoanRequest {
    pub loan_type: LoanType,
    pub name: String,
    pub loan_number: Option<i64>,
    pub amount: f64,
    pub interest_rate: f64,
    pub loan_term_years: i32,
    pub start_date: Option<String>,
}

/// UpdateLoanRequest
///
/// Partial update payload for `PATCH /loans/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateLoanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_type: Option<LoanType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_term_years: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

// --- Response Envelope ---

/// ApiResponse
///
/// Success envelope shared by every JSON endpoint: `status` is always
/// `"success"`, `results` is present on list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            results: None,
            data,
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn list(data: Vec<T>) -> Self {
        Self {
            status: "success".to_string(),
            results: Some(data.len()),
            data,
        }
    }
}
