//! End-to-end identity flows over an assembled router, plus concurrent
//! provisioning against a shared store.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use campus_erp_backend::auth::{
    api as auth_api,
    identity_store::{build_pool, DbPool},
    idgen, require_roles, session_bootstrap, AuditRecorder, AuthState, IdentityStore,
    PasswordHasher, TokenService, ADMIN_ONLY,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tower::ServiceExt;

// bcrypt's minimum work factor; the crate keeps its own constant private.
const MIN_COST: u32 = 4;

fn test_state() -> (AuthState, DbPool, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap();
    let pool = build_pool(path, 8, Duration::from_secs(5)).unwrap();
    let store = Arc::new(
        IdentityStore::new(pool.clone(), PasswordHasher::new(MIN_COST)).unwrap(),
    );
    let tokens = Arc::new(TokenService::new("integration-secret".to_string(), 7));
    let audit = AuditRecorder::new(pool.clone());
    (AuthState::new(store, tokens, audit), pool, temp_file)
}

/// Router wired the way the binary wires it, minus the per-IP limiter
/// (oneshot requests carry no peer address).
fn test_app(state: AuthState) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/api/auth/profile", get(auth_api::get_profile))
        .route("/api/students/:id", get(auth_api::get_student))
        .route_layer(from_fn_with_state(state.clone(), session_bootstrap))
        .with_state(state.clone());

    let admin = Router::new()
        .route("/api/admin/identities", get(auth_api::admin_list_identities))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(from_fn_with_state(state.clone(), session_bootstrap))
        .with_state(state);

    Router::new().merge(public).merge(protected).merge(admin)
}

fn student_payload(email: &str) -> Value {
    json!({
        "email": email,
        "password": "secret1",
        "role": "student",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "course": "CS",
        "semester": 1,
        "academic_year": "2024-2025",
    })
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn authed_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[test]
fn concurrent_registrations_allocate_distinct_numbers() {
    let (state, _pool, _temp) = test_state();
    let store = state.store.clone();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || {
                let req = serde_json::from_value(student_payload(&format!("s{}@x.edu", i)))
                    .unwrap();
                store.register(&req).map(|o| o.student_number.unwrap())
            })
        })
        .collect();

    let numbers: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let distinct: HashSet<&String> = numbers.iter().collect();
    assert_eq!(distinct.len(), 8);

    // Exactly sequences 1 through 8 under the current year prefix.
    let year = idgen::current_year_suffix();
    let expected: HashSet<String> = (1..=8)
        .map(|seq| idgen::format_student_number(year, seq))
        .collect();
    assert_eq!(numbers.into_iter().collect::<HashSet<_>>(), expected);
}

#[tokio::test]
async fn register_login_profile_flow() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state);

    let (status, body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));

    let number = body["user"]["student_number"].as_str().unwrap();
    assert_eq!(number.len(), 6);
    let year = idgen::current_year_suffix();
    assert!(number.starts_with(&format!("{:02}", year)));

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/login",
            &json!({ "email": "a@x.edu", "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(body["user"]["student_number"], json!(number));

    let (status, body) = send(&app, authed_get("/api/auth/profile", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], json!("a@x.edu"));
    assert_eq!(body["student"]["course"], json!("CS"));
    assert!(body["last_activity"].is_string());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state);

    let (status, _) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn missing_and_malformed_tokens_are_rejected() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state);

    let bare = Request::builder()
        .method("GET")
        .uri("/api/auth/profile")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, bare).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(&app, authed_get("/api/auth/profile", "not.a.token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_account_token_is_rejected() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state.clone());

    let (_, body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    let token = body["token"].as_str().unwrap().to_string();
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();

    // Works while active.
    let (status, _) = send(&app, authed_get("/api/auth/profile", &token)).await;
    assert_eq!(status, StatusCode::OK);

    state.store.set_active(id, false).unwrap();

    // The still-valid token no longer resolves to a usable session.
    let (status, body) = send(&app, authed_get("/api/auth/profile", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Account is deactivated"));
}

#[tokio::test]
async fn admin_routes_enforce_declared_roles() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state.clone());

    let (_, body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    let student_token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, authed_get("/api/admin/identities", &student_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/api/auth/register",
            &json!({
                "email": "root@x.edu",
                "password": "secret1",
                "role": "admin",
                "first_name": "Root",
                "last_name": "Admin",
            }),
        ),
    )
    .await;
    let admin_token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, authed_get("/api/admin/identities", &admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn student_record_access_is_owner_or_admin() {
    let (state, _pool, _temp) = test_state();
    let app = test_app(state.clone());

    let (_, owner_body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("a@x.edu")),
    )
    .await;
    let owner_token = owner_body["token"].as_str().unwrap().to_string();
    let owner_id = owner_body["user"]["id"].as_str().unwrap().parse().unwrap();

    let (_, other_body) = send(
        &app,
        json_request("POST", "/api/auth/register", &student_payload("b@x.edu")),
    )
    .await;
    let other_token = other_body["token"].as_str().unwrap().to_string();

    let record = state.store.student_profile(owner_id).unwrap().unwrap();
    let uri = format!("/api/students/{}", record.id);

    let (status, body) = send(&app, authed_get(&uri, &owner_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["student_number"], owner_body["user"]["student_number"]);

    let (status, _) = send(&app, authed_get(&uri, &other_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
