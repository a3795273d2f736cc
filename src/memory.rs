use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::StoreError,
    features::QueryDescriptor,
    models::{Loan, LoanPatch, NewLoan, NewUser, User, UserPatch},
    repository::Repository,
};

/// InMemoryRepository
///
/// Process-local implementation of the `Repository` contract. Used when no
/// `DATABASE_URL` is configured locally and as the backing store in tests.
/// Query descriptors are evaluated directly against the stored records.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<Vec<User>>,
    loans: RwLock<Vec<Loan>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn evaluation_failed(err: serde_json::Error) -> StoreError {
    tracing::error!(error = %err, "in-memory query evaluation failed");
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn find_users(&self, query: &QueryDescriptor<User>) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        query.evaluate(&users).map_err(evaluation_failed)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(StoreError::Duplicate { field: "email" });
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            photo: user.photo,
            role: user.role,
            password_hash: user.password_hash,
            password_changed_at: now,
            active: true,
            created_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;

        if let Some(email) = &patch.email {
            if users.iter().any(|user| user.id != id && &user.email == email) {
                return Err(StoreError::Duplicate { field: "email" });
            }
        }

        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(photo) = patch.photo {
            user.photo = Some(photo);
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(active) = patch.active {
            user.active = active;
        }
        if let Some(password_hash) = patch.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(changed_at) = patch.password_changed_at {
            user.password_changed_at = changed_at;
        }

        Ok(Some(user.clone()))
    }

    async fn find_loans(&self, query: &QueryDescriptor<Loan>) -> Result<Vec<Loan>, StoreError> {
        let loans = self.loans.read().await;
        query.evaluate(&loans).map_err(evaluation_failed)
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>, StoreError> {
        let loans = self.loans.read().await;
        Ok(loans.iter().find(|loan| loan.id == id).cloned())
    }

    async fn create_loan(&self, loan: NewLoan) -> Result<Loan, StoreError> {
        let now = Utc::now();
        let created = Loan {
            id: Uuid::new_v4(),
            loan_type: loan.loan_type,
            name: loan.name,
            loan_number: loan.loan_number,
            amount: loan.amount,
            interest_rate: loan.interest_rate,
            loan_term_years: loan.loan_term_years,
            start_date: loan.start_date,
            created_date: now,
            modified_date: now,
            is_deleted: false,
        };
        self.loans.write().await.push(created.clone());
        Ok(created)
    }

    async fn update_loan(&self, id: Uuid, patch: LoanPatch) -> Result<Option<Loan>, StoreError> {
        let mut loans = self.loans.write().await;
        let Some(loan) = loans.iter_mut().find(|loan| loan.id == id) else {
            return Ok(None);
        };

        if let Some(loan_type) = patch.loan_type {
            loan.loan_type = loan_type;
        }
        if let Some(name) = patch.name {
            loan.name = name;
        }
        if let Some(loan_number) = patch.loan_number {
            loan.loan_number = Some(loan_number);
        }
        if let Some(amount) = patch.amount {
            loan.amount = amount;
        }
        if let Some(interest_rate) = patch.interest_rate {
            loan.interest_rate = interest_rate;
        }
        if let Some(years) = patch.loan_term_years {
            loan.loan_term_years = years;
        }
        if let Some(start_date) = patch.start_date {
            loan.start_date = Some(start_date);
        }
        if let Some(is_deleted) = patch.is_deleted {
            loan.is_deleted = is_deleted;
        }
        loan.modified_date = Utc::now();

        Ok(Some(loan.clone()))
    }

    async fn delete_loan(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut loans = self.loans.write().await;
        let before = loans.len();
        loans.retain(|loan| loan.id != id);
        Ok(loans.len() < before)
    }
}
