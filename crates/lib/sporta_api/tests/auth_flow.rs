//! Integration tests: drive the full router over in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{NaiveDate, Utc};
use serde_json::{Value, json};
use sporta_api::{AppState, router};
use sporta_core::auth::password::hash_password;
use sporta_core::auth::session::SessionService;
use sporta_core::cache::EphemeralCache;
use sporta_core::cache::memory::MemoryCache;
use sporta_core::config::AuthConfig;
use sporta_core::models::auth::NewUser;
use sporta_core::store::CredentialStore;
use sporta_core::store::memory::MemoryCredentialStore;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const GUEST: i64 = 1;
const USER: i64 = 2;
const ADMIN: i64 = 3;

struct TestApp {
    router: Router,
    session: Arc<SessionService>,
    store: Arc<MemoryCredentialStore>,
    cache: Arc<MemoryCache>,
}

fn test_app(default_role: i64) -> TestApp {
    let store = Arc::new(
        MemoryCredentialStore::new()
            .with_role(GUEST, ["profile.view.own"])
            .with_role(USER, ["profile.delete.own", "profile.view.own"])
            .with_role(
                ADMIN,
                ["profile.delete.own", "profile.view.own", "sessions.revoke.any"],
            )
            .with_default_role(default_role),
    );
    let cache = Arc::new(MemoryCache::new());
    let mut config = AuthConfig::new("it-access-secret", "it-refresh-secret");
    config.otp_fixed_code = Some("0000".into());
    let session = Arc::new(SessionService::new(config, store.clone(), cache.clone()));
    let state = AppState::new(session.clone(), CancellationToken::new());
    TestApp {
        router: router(state),
        session,
        store,
        cache,
    }
}

async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.router.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

fn registration(email: &str, phone: &str) -> Value {
    json!({
        "name": "Ivan",
        "surname": "Petrov",
        "gender": "male",
        "birth_date": "31-12-1999",
        "phone_number": phone,
        "email": email,
        "password": "correct horse",
    })
}

async fn register(app: &TestApp, email: &str, phone: &str) -> (String, String) {
    let (status, body) = call(
        app,
        "POST",
        "/api/v1/auth/registration",
        None,
        Some(registration(email, phone)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    tokens(&body)
}

async fn login(app: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

fn tokens(body: &Value) -> (String, String) {
    (
        body["access_token"].as_str().expect("access_token").to_string(),
        body["refresh_token"].as_str().expect("refresh_token").to_string(),
    )
}

#[tokio::test]
async fn register_login_and_read_profile() {
    let app = test_app(USER);
    register(&app, "Ivan@Example.com", "+79990001122").await;

    let (status, body) = login(&app, "ivan@example.com", "correct horse").await;
    assert_eq!(status, StatusCode::OK);
    let (access, _) = tokens(&body);
    assert_eq!(access.split('.').count(), 3);

    let (status, profile) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "ivan@example.com");
    assert_eq!(profile["birth_date"], "1999-12-31");
    assert!(profile.get("password").is_none());
    assert!(profile.get("password_hash").is_none());
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let app = test_app(USER);
    register(&app, "a@x.io", "1").await;

    let (s1, wrong_password) = login(&app, "a@x.io", "nope").await;
    let (s2, unknown_email) = login(&app, "nobody@x.io", "correct horse").await;
    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password["message"], "Invalid email or password");
}

#[tokio::test]
async fn registration_errors() {
    let app = test_app(USER);
    let mut bad_date = registration("a@x.io", "1");
    bad_date["birth_date"] = json!("1999-12-31");
    let (status, body) =
        call(&app, "POST", "/api/v1/auth/registration", None, Some(bad_date)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parse_error");

    register(&app, "a@x.io", "1").await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/registration",
        None,
        Some(registration("a@x.io", "2")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn bearer_header_is_required() {
    let app = test_app(USER);
    let (status, _) = call(&app, "GET", "/api/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_be_used_as_bearer() {
    let app = test_app(USER);
    let (_, refresh) = register(&app, "a@x.io", "1").await;
    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_kills_unexpired_access_token() {
    let app = test_app(USER);
    let (access, refresh) = register(&app, "a@x.io", "1").await;
    let (status, profile) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let user_id = profile["id"].as_i64().unwrap();

    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/auth/logout",
        None,
        Some(json!({ "user_id": user_id + 1, "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/logout",
        None,
        Some(json!({ "user_id": user_id, "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "refresh_token_revoked");
}

#[tokio::test]
async fn refresh_replaces_the_live_access_token() {
    let app = test_app(USER);
    let (old_access, refresh) = register(&app, "a@x.io", "1").await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (new_access, new_refresh) = tokens(&body);
    assert_ne!(new_refresh, refresh);

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&new_access), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&old_access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_permission_is_listed() {
    let app = test_app(GUEST);
    let (access, _) = register(&app, "a@x.io", "1").await;

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "DELETE", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["missing"], json!(["profile.delete.own"]));
}

#[tokio::test]
async fn delete_account_then_login_fails() {
    let app = test_app(USER);
    let (access, _) = register(&app, "a@x.io", "1").await;

    let (status, _) = call(&app, "DELETE", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = login(&app, "a@x.io", "correct horse").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_without_email_is_rejected() {
    let app = test_app(USER);
    let (access, _) = register(&app, "a@x.io", "1").await;
    let user_id = app.session.verify_access_token(&access).unwrap().user_id;

    let issued = app
        .session
        .issuer()
        .issue_access_token(user_id, "", &["profile.view.own".to_string()], Utc::now())
        .unwrap();
    let ctx = CancellationToken::new();
    app.cache
        .set(
            &ctx,
            &app.session.config().access_token_key(user_id),
            &issued.jti,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    let (status, body) = call(&app, "GET", "/api/v1/users/me", Some(&issued.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token carries no email");
}

#[tokio::test]
async fn deleted_user_is_rejected_while_marker_lives() {
    let app = test_app(USER);
    let (access, refresh) = register(&app, "a@x.io", "1").await;
    let claims = app.session.verify_access_token(&access).unwrap();

    let ctx = CancellationToken::new();
    assert!(app.store.soft_delete_user(&ctx, claims.user_id).await.unwrap());
    assert!(
        app.session
            .access_token_alive(&ctx, claims.user_id, &claims.jti)
            .await
            .unwrap()
    );

    let (status, body) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User no longer exists");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn admin_revokes_another_users_sessions() {
    let app = test_app(USER);
    let (user_access, user_refresh) = register(&app, "user@x.io", "1").await;
    let (_, profile) = call(&app, "GET", "/api/v1/users/me", Some(&user_access), None).await;
    let user_id = profile["id"].as_i64().unwrap();

    let ctx = CancellationToken::new();
    app.store
        .create_user(
            &ctx,
            &NewUser {
                name: "Anna".into(),
                surname: "Admin".into(),
                gender: "female".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                height_cm: None,
                weight_kg: None,
                sport_activity_level_id: None,
                town_id: None,
                role_id: Some(ADMIN),
                phone_number: "2".into(),
                email: "admin@x.io".into(),
                password_hash: hash_password("admin pass").unwrap(),
                is_have_injury: false,
                injury_description: None,
                photo: None,
            },
        )
        .await
        .unwrap();

    let uri = format!("/api/v1/admin/users/{user_id}/sessions/revoke");

    // An ordinary user lacks the admin permission.
    let (status, _) = call(&app, "POST", &uri, Some(&user_access), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = login(&app, "admin@x.io", "admin pass").await;
    assert_eq!(status, StatusCode::OK);
    let (admin_access, _) = tokens(&body);

    let (status, body) = call(&app, "POST", &uri, Some(&admin_access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 1);

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&user_access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(
        &app,
        "POST",
        "/api/v1/auth/refresh",
        None,
        Some(json!({ "refresh_token": user_refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn otp_flow() {
    let app = test_app(USER);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/otp/send",
        None,
        Some(json!({ "identifier": "+79990001122" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["otp_sent"], true);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/otp/confirm",
        None,
        Some(json!({ "identifier": "+79990001122", "code": "1111" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "otp_mismatch");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/otp/confirm",
        None,
        Some(json!({ "identifier": "+79990001122", "code": "0000" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["otp_confirmed"], true);
    assert_eq!(body["is_registered"], false);
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
async fn otp_confirm_signs_in_registered_phone() {
    let app = test_app(USER);
    register(&app, "a@x.io", "+79990001122").await;

    call(
        &app,
        "POST",
        "/api/v1/auth/otp/send",
        None,
        Some(json!({ "identifier": "+79990001122" })),
    )
    .await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/v1/auth/otp/confirm",
        None,
        Some(json!({ "identifier": "+79990001122", "code": "0000" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_registered"], true);
    let (access, _) = tokens(&body);

    let (status, _) = call(&app, "GET", "/api/v1/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
}
