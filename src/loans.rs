//! Loan record service.

use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    features::QueryDescriptor,
    models::{CreateLoanRequest, Loan, LoanListing, LoanPatch, NewLoan, UpdateLoanRequest},
    repository::Repository,
};

/// calculate_payment
///
/// Fixed monthly payment that repays `principal` at `annual_rate` over `years`,
/// rounded to cents: `P·r / (1 − (1 + r)^−n)` with `r = annual_rate / 12` and
/// `n = years · 12`. A zero rate divides the principal evenly; a zero term
/// returns the principal.
///
/// This is the payment form. The `(P / r)·(1 − (1 + r)^−n)` form found in older
/// loan code is the present value of a unit annuity and would not give the
/// 599.55 expected for 100000 at 6% over 30 years.
pub fn calculate_payment(principal: f64, annual_rate: f64, years: i32) -> f64 {
    let months = f64::from(years) * 12.0;
    if months <= 0.0 {
        return round_cents(principal);
    }

    let monthly_rate = annual_rate / 12.0;
    let payment = if monthly_rate == 0.0 {
        principal / months
    } else {
        principal * monthly_rate / (1.0 - (1.0 + monthly_rate).powf(-months))
    };

    round_cents(payment)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<Loan> for LoanListing {
    fn from(loan: Loan) -> Self {
        let calculated_loan_amount =
            calculate_payment(loan.amount, loan.interest_rate, loan.loan_term_years);
        Self {
            loan,
            calculated_loan_amount,
        }
    }
}

// --- Validation ---

fn check_amounts(amount: Option<f64>, rate: Option<f64>, years: Option<i32>) -> AppResult<()> {
    if amount.is_some_and(|amount| !amount.is_finite() || amount < 0.0) {
        return Err(AppError::Validation("Loan amount must be a non-negative number".into()));
    }
    if rate.is_some_and(|rate| !rate.is_finite() || rate < 0.0) {
        return Err(AppError::Validation("Interest rate must be a non-negative number".into()));
    }
    if years.is_some_and(|years| years < 1) {
        return Err(AppError::Validation("Loan term must be at least one year".into()));
    }
    Ok(())
}

fn owner_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("A loan must have an owner name".into()));
    }
    Ok(name.to_string())
}

// --- Operations ---

/// Lists loans through the query pipeline. Each document is projected and then
/// carries a freshly computed `calculatedLoanAmount`.
pub async fn list_loans(repo: &dyn Repository, params: &[(String, String)]) -> AppResult<Vec<Value>> {
    let descriptor = QueryDescriptor::<Loan>::from_params(params)?;
    let loans = repo.find_loans(&descriptor).await?;

    loans
        .into_iter()
        .map(|loan| {
            let payment = calculate_payment(loan.amount, loan.interest_rate, loan.loan_term_years);
            let document = serde_json::to_value(&loan)
                .map_err(|e| AppError::Internal(format!("loan serialization failed: {e}")))?;

            let mut document = descriptor.projection.apply(document);
            if let Value::Object(map) = &mut document {
                map.insert("calculatedLoanAmount".into(), json!(payment));
            }
            Ok(document)
        })
        .collect()
}

/// Loans whose owner `name` equals the `name` parameter, or the caller's own
/// name when the parameter is absent.
pub async fn list_my_loans(
    repo: &dyn Repository,
    params: &[(String, String)],
    caller_name: &str,
) -> AppResult<Vec<Value>> {
    let owner = params
        .iter()
        .rev()
        .find(|(key, _)| key == "name")
        .map(|(_, value)| value.clone())
        .unwrap_or_else(|| caller_name.to_string());

    let mut scoped: Vec<(String, String)> = params
        .iter()
        .filter(|(key, _)| key != "name")
        .cloned()
        .collect();
    scoped.push(("name".into(), owner));

    list_loans(repo, &scoped).await
}

pub async fn get_loan(repo: &dyn Repository, id: Uuid) -> AppResult<LoanListing> {
    repo.get_loan(id)
        .await?
        .map(LoanListing::from)
        .ok_or(AppError::NotFound("Loan"))
}

pub async fn create_loan(repo: &dyn Repository, req: CreateLoanRequest) -> AppResult<LoanListing> {
    check_amounts(Some(req.amount), Some(req.interest_rate), Some(req.loan_term_years))?;

    let loan = repo
        .create_loan(NewLoan {
            loan_type: req.loan_type,
            name: owner_name(&req.name)?,
            loan_number: req.loan_number,
            amount: req.amount,
            interest_rate: req.interest_rate,
            loan_term_years: req.loan_term_years,
            start_date: req.start_date,
        })
        .await?;

    tracing::info!(loan_id = %loan.id, loan_type = loan.loan_type.as_str(), "loan created");
    Ok(loan.into())
}

pub async fn update_loan(
    repo: &dyn Repository,
    id: Uuid,
    req: UpdateLoanRequest,
) -> AppResult<LoanListing> {
    check_amounts(req.amount, req.interest_rate, req.loan_term_years)?;

    let patch = LoanPatch {
        loan_type: req.loan_type,
        name: req.name.as_deref().map(owner_name).transpose()?,
        loan_number: req.loan_number,
        amount: req.amount,
        interest_rate: req.interest_rate,
        loan_term_years: req.loan_term_years,
        start_date: req.start_date,
        is_deleted: req.is_deleted,
    };

    repo.update_loan(id, patch)
        .await?
        .map(LoanListing::from)
        .ok_or(AppError::NotFound("Loan"))
}

/// Hard delete. The `isDeleted` flag is left to explicit updates.
pub async fn delete_loan(repo: &dyn Repository, id: Uuid) -> AppResult<()> {
    if repo.delete_loan(id).await? {
        tracing::info!(loan_id = %id, "loan deleted");
        Ok(())
    } else {
        Err(AppError::NotFound("Loan"))
    }
}
