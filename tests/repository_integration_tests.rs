use chrono::Utc;
use loan_portal::{
    InMemoryRepository, PostgresRepository,
    error::StoreError,
    features::QueryDescriptor,
    models::{Loan, LoanPatch, LoanType, NewLoan, NewUser, Role, User, UserPatch},
    repository::Repository,
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

// --- Test Context and Setup ---

/// Every store the suite can reach: always the in-memory one, plus Postgres
/// when `DATABASE_URL` points at a database.
async fn stores() -> Vec<(&'static str, Box<dyn Repository>)> {
    dotenv::dotenv().ok();

    let mut stores: Vec<(&'static str, Box<dyn Repository>)> =
        vec![("memory", Box::new(InMemoryRepository::new()))];

    if let Some(db_url) = std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()) {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");
        stores.push(("postgres", Box::new(PostgresRepository::new(pool))));
    }

    stores
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// --- Test Data Helpers ---

/// Unique per call so runs against a shared database never collide.
fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

fn new_user(email: &str, role: Role) -> NewUser {
    NewUser {
        name: "Repo Tester".into(),
        email: email.into(),
        photo: None,
        role,
        password_hash: "$2b$04$not-a-real-hash".into(),
    }
}

fn new_loan(owner: &str, amount: f64, loan_type: LoanType) -> NewLoan {
    NewLoan {
        loan_type,
        name: owner.into(),
        loan_number: Some(7),
        amount,
        interest_rate: 0.05,
        loan_term_years: 15,
        start_date: Some("2024-05-01".into()),
    }
}

// --- Users ---

#[tokio::test]
async fn test_create_and_find_user_by_email() {
    for (backend, repo) in stores().await {
        let email = unique_email("find");
        let created = repo.create_user(new_user(&email, Role::Staff)).await.unwrap();

        assert!(created.active, "{backend}: new users start active");
        assert_eq!(created.role, Role::Staff);

        let found = repo.find_user_by_email(&email).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id), "{backend}");

        let fetched = repo.get_user(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.password_hash, created.password_hash);
    }
}

#[tokio::test]
async fn test_new_user_timestamps_follow_application_clock() {
    for (backend, repo) in stores().await {
        let before = Utc::now().timestamp();
        let created = repo
            .create_user(new_user(&unique_email("clock"), Role::User))
            .await
            .unwrap();
        let after = Utc::now().timestamp();

        // Same clock as token `iat`.
        let changed = created.password_changed_at.timestamp();
        assert!(before <= changed && changed <= after, "{backend}: {changed} not in {before}..={after}");
        assert_eq!(created.created_at, created.password_changed_at);
    }
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    for (backend, repo) in stores().await {
        let email = unique_email("dup");
        repo.create_user(new_user(&email, Role::User)).await.unwrap();

        let err = repo.create_user(new_user(&email, Role::User)).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Duplicate { field: "email" }),
            "{backend}: got {err:?}"
        );
    }
}

#[tokio::test]
async fn test_update_user_applies_only_supplied_fields() {
    for (backend, repo) in stores().await {
        let created = repo
            .create_user(new_user(&unique_email("patch"), Role::User))
            .await
            .unwrap();

        let updated = repo
            .update_user(
                created.id,
                UserPatch {
                    role: Some(Role::Admin),
                    active: Some(false),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap()
            .expect("user exists");

        assert_eq!(updated.role, Role::Admin, "{backend}");
        assert!(!updated.active);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.password_hash, created.password_hash);
    }
}

#[tokio::test]
async fn test_update_missing_user_is_none() {
    for (backend, repo) in stores().await {
        let result = repo
            .update_user(Uuid::new_v4(), UserPatch::default())
            .await
            .unwrap();
        assert!(result.is_none(), "{backend}");
    }
}

#[tokio::test]
async fn test_user_filter_by_role_and_email() {
    for (backend, repo) in stores().await {
        let email = unique_email("filter");
        let admin = repo.create_user(new_user(&email, Role::Admin)).await.unwrap();
        repo.create_user(new_user(&unique_email("filter"), Role::User))
            .await
            .unwrap();

        let query =
            QueryDescriptor::<User>::from_params(&params(&[("email", &email), ("role", "admin")]))
                .unwrap();
        let found = repo.find_users(&query).await.unwrap();

        assert_eq!(found.len(), 1, "{backend}");
        assert_eq!(found[0].id, admin.id);
    }
}

// --- Loans ---

#[tokio::test]
async fn test_create_loan_sets_dates_and_flags() {
    for (backend, repo) in stores().await {
        let owner = format!("owner-{}", Uuid::new_v4().simple());
        let loan = repo
            .create_loan(new_loan(&owner, 12_000.0, LoanType::Auto))
            .await
            .unwrap();

        assert_eq!(loan.loan_type, LoanType::Auto, "{backend}");
        assert!(!loan.is_deleted);
        assert_eq!(loan.created_date, loan.modified_date);
        assert_eq!(repo.get_loan(loan.id).await.unwrap(), Some(loan));
    }
}

#[tokio::test]
async fn test_loan_filters_sort_and_paging() {
    for (backend, repo) in stores().await {
        let owner = format!("owner-{}", Uuid::new_v4().simple());
        for (amount, loan_type) in [
            (1_000.0, LoanType::Home),
            (4_000.0, LoanType::Boat),
            (2_500.0, LoanType::Home),
            (9_000.0, LoanType::Home),
        ] {
            repo.create_loan(new_loan(&owner, amount, loan_type))
                .await
                .unwrap();
        }

        let query = QueryDescriptor::<Loan>::from_params(&params(&[
            ("name", &owner),
            ("loanType", "Home"),
            ("amount[gt]", "1500"),
            ("sort", "-amount"),
        ]))
        .unwrap();
        let amounts: Vec<f64> = repo
            .find_loans(&query)
            .await
            .unwrap()
            .iter()
            .map(|loan| loan.amount)
            .collect();
        assert_eq!(amounts, vec![9_000.0, 2_500.0], "{backend}");

        let page_two = QueryDescriptor::<Loan>::from_params(&params(&[
            ("name", &owner),
            ("sort", "amount"),
            ("limit", "3"),
            ("page", "2"),
        ]))
        .unwrap();
        let rest = repo.find_loans(&page_two).await.unwrap();
        assert_eq!(rest.len(), 1, "{backend}");
        assert_eq!(rest[0].amount, 9_000.0);
    }
}

#[tokio::test]
async fn test_update_loan_touches_modified_date() {
    for (backend, repo) in stores().await {
        let loan = repo
            .create_loan(new_loan("Patchy", 3_000.0, LoanType::Life))
            .await
            .unwrap();

        let updated = repo
            .update_loan(
                loan.id,
                LoanPatch {
                    interest_rate: Some(0.09),
                    is_deleted: Some(true),
                    ..LoanPatch::default()
                },
            )
            .await
            .unwrap()
            .expect("loan exists");

        assert_eq!(updated.interest_rate, 0.09, "{backend}");
        assert!(updated.is_deleted);
        assert_eq!(updated.amount, loan.amount);
        assert_eq!(updated.created_date, loan.created_date);
        assert!(updated.modified_date >= loan.modified_date);
    }
}

#[tokio::test]
async fn test_delete_loan_reports_whether_it_existed() {
    for (backend, repo) in stores().await {
        let loan = repo
            .create_loan(new_loan("Gone", 500.0, LoanType::Home))
            .await
            .unwrap();

        assert!(repo.delete_loan(loan.id).await.unwrap(), "{backend}");
        assert!(!repo.delete_loan(loan.id).await.unwrap());
        assert!(repo.get_loan(loan.id).await.unwrap().is_none());
        assert!(
            repo.update_loan(loan.id, LoanPatch::default())
                .await
                .unwrap()
                .is_none()
        );
    }
}
