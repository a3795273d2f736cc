use loan_portal::{
    AppConfig, AppState, InMemoryRepository, InMemorySessionStore, create_router,
    models::{Role, UpdateUserRequest},
    users,
};
use reqwest::{StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub state: AppState,
}

async fn spawn_app() -> TestApp {
    let state = AppState::new(
        Arc::new(InMemoryRepository::new()),
        Arc::new(InMemorySessionStore::new()),
        AppConfig::default(),
    );
    let router = create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, state }
}

/// Login answers with a redirect; the client must not follow it.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn signup(app: &TestApp, client: &reqwest::Client, email: &str) -> Value {
    let response = client
        .post(format!("{}/api/v1/users/signup", app.address))
        .json(&json!({
            "name": "Api Tester",
            "email": email,
            "password": "pass1234",
            "passwordConfirm": "pass1234"
        }))
        .send()
        .await
        .expect("signup request");
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.unwrap()
}

/// Logs in and returns the `jwt` and `sid` cookie pairs.
async fn login(app: &TestApp, client: &reqwest::Client, email: &str) -> (String, String) {
    let response = client
        .post(format!("{}/api/v1/users/login", app.address))
        .json(&json!({ "email": email, "password": "pass1234" }))
        .send()
        .await
        .expect("login request");
    assert_eq!(response.status(), StatusCode::FOUND);

    let pairs: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::to_string)
        .collect();
    let find = |name: &str| {
        pairs
            .iter()
            .find(|pair| pair.starts_with(&format!("{name}=")))
            .cloned()
            .unwrap_or_else(|| panic!("missing {name} cookie"))
    };
    (find("jwt"), find("sid"))
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_signup_login_and_me() {
    let app = spawn_app().await;
    let client = client();

    let created = signup(&app, &client, "api@example.com").await;
    assert_eq!(created["status"], "success");
    assert_eq!(created["data"]["user"]["role"], "user");
    assert!(created["data"]["user"].get("passwordHash").is_none());

    let (jwt, _) = login(&app, &client, "api@example.com").await;
    let token = jwt.trim_start_matches("jwt=");

    // Bearer header and cookie resolve the same caller.
    let by_bearer: Value = client
        .get(format!("{}/api/v1/users/me", app.address))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let by_cookie: Value = client
        .get(format!("{}/api/v1/users/me", app.address))
        .header(header::COOKIE, &jwt)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(by_bearer["data"]["user"]["email"], "api@example.com");
    assert_eq!(by_bearer, by_cookie);
}

#[tokio::test]
async fn test_unauthenticated_request_is_rejected() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/api/v1/users/me", app.address))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(
        body["message"],
        "You are not logged in! Please log in to get access."
    );
}

#[tokio::test]
async fn test_staff_loan_lifecycle() {
    let app = spawn_app().await;
    let client = client();

    let created = signup(&app, &client, "staff@example.com").await;
    let id = created["data"]["user"]["id"].as_str().unwrap().parse().unwrap();
    users::update_user(
        app.state.repo.as_ref(),
        &app.state.hasher,
        id,
        UpdateUserRequest {
            role: Some(Role::Staff),
            ..UpdateUserRequest::default()
        },
    )
    .await
    .unwrap();
    let (jwt, _) = login(&app, &client, "staff@example.com").await;

    let response = client
        .post(format!("{}/api/v1/loans", app.address))
        .header(header::COOKIE, &jwt)
        .json(&json!({
            "loanType": "Boat", "name": "Api Tester", "amount": 20000,
            "interestRate": 0.07, "loanTermYears": 5, "startDate": "2024-06-01"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let loan: Value = response.json().await.unwrap();
    let loan_id = loan["data"]["loan"]["id"].as_str().unwrap().to_string();

    let mine: Value = client
        .get(format!("{}/api/v1/loans/my", app.address))
        .header(header::COOKIE, &jwt)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["results"], 1);

    let response = client
        .delete(format!("{}/api/v1/loans/{loan_id}", app.address))
        .header(header::COOKIE, &jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .get(format!("{}/api/v1/loans/{loan_id}", app.address))
        .header(header::COOKIE, &jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_invalidates_cookie_session() {
    let app = spawn_app().await;
    let client = client();
    signup(&app, &client, "out@example.com").await;
    let (_, sid) = login(&app, &client, "out@example.com").await;

    let page = client
        .get(format!("{}/myLoanLists", app.address))
        .header(header::COOKIE, &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);

    let response = client
        .get(format!("{}/api/v1/users/logout", app.address))
        .header(header::COOKIE, &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = client
        .get(format!("{}/myLoanLists", app.address))
        .header(header::COOKIE, &sid)
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::UNAUTHORIZED);
}
