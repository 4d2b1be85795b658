use super::*;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::Role;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    last_login: Arc<Mutex<Option<LoginRequest>>>,
}

async fn spawn_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}/api")
}

fn remote(base_url: &str) -> HttpAuthRemote {
    HttpAuthRemote::new(base_url, Some(Duration::from_secs(5))).expect("remote")
}

async fn flat_login(
    State(state): State<ServerState>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let accepted = request.username == "alice" && request.password == "pw1";
    state.last_login.lock().await.replace(request);
    if accepted {
        (
            StatusCode::OK,
            Json(json!({"token": "t1", "username": "alice", "role": "USER"})),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"})))
    }
}

fn fixed_login(body: Value) -> Router {
    Router::new().route(
        "/api/auth/login",
        post(move || {
            let body = body.clone();
            async move { Json(body) }
        }),
    )
}

async fn profile_me(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some("Bearer t1");
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Unauthorized"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "User retrieved successfully",
            "data": {"id": 9, "username": "bob", "email": "bob@example.com", "role": "ADMIN", "isActive": true}
        })),
    )
}

#[tokio::test]
async fn login_posts_credentials_and_reads_flat_body() {
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/auth/login", post(flat_login))
        .with_state(state.clone());
    let base_url = spawn_server(app).await;

    let grant = remote(&base_url)
        .login(&Credentials::new("alice", "pw1"))
        .await
        .expect("login");

    assert_eq!(grant.token, "t1");
    assert_eq!(grant.profile.username, "alice");
    assert_eq!(grant.profile.role, Role::User);
    assert_eq!(grant.profile.email, "");
    let sent = state.last_login.lock().await.clone().expect("request");
    assert_eq!(sent.username, "alice");
    assert_eq!(sent.password, "pw1");
}

#[tokio::test]
async fn login_rejection_carries_status_code() {
    let app = Router::new()
        .route("/api/auth/login", post(flat_login))
        .with_state(ServerState::default());
    let base_url = spawn_server(app).await;

    let err = remote(&base_url)
        .login(&Credentials::new("alice", "nope"))
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::Rejected(401));
}

#[tokio::test]
async fn login_accepts_backend_envelope() {
    let base_url = spawn_server(
        fixed_login(json!({
            "success": true,
            "message": "Login successful",
            "data": {"token": "t2", "id": 5, "username": "carol", "email": "carol@example.com", "role": "ADMIN", "isActive": true}
        })),
    )
    .await;

    let grant = remote(&base_url)
        .login(&Credentials::new("carol", "pw"))
        .await
        .expect("login");
    assert_eq!(grant.token, "t2");
    assert_eq!(grant.profile.id, "5");
    assert_eq!(grant.profile.role, Role::Admin);
    assert_eq!(grant.profile.email, "carol@example.com");
}

#[tokio::test]
async fn declined_envelope_is_a_rejection() {
    let base_url = spawn_server(
        fixed_login(json!({"success": false, "message": "Account is inactive"})),
    )
    .await;

    let err = remote(&base_url)
        .login(&Credentials::new("dave", "pw"))
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::Rejected(200));
}

#[tokio::test]
async fn login_without_token_is_malformed() {
    let base_url = spawn_server(fixed_login(json!({"username": "erin", "role": "USER"}))).await;

    let err = remote(&base_url)
        .login(&Credentials::new("erin", "pw"))
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::MalformedResponse);
}

#[tokio::test]
async fn non_json_success_body_is_malformed() {
    let app = Router::new().route("/api/auth/login", post(|| async { "<html>ok</html>" }));
    let base_url = spawn_server(app).await;

    let err = remote(&base_url)
        .login(&Credentials::new("alice", "pw1"))
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::MalformedResponse);
}

#[tokio::test]
async fn fetch_profile_sends_bearer_token_and_unwraps_envelope() {
    let app = Router::new().route("/api/user/me", get(profile_me));
    let base_url = spawn_server(app).await;
    let remote = remote(&base_url);

    let profile = remote.fetch_profile("t1").await.expect("profile");
    assert_eq!(profile.id, "9");
    assert_eq!(profile.username, "bob");
    assert_eq!(profile.role, Role::Admin);
    assert!(profile.is_active);

    let err = remote.fetch_profile("expired").await.expect_err("must fail");
    assert_eq!(err, AuthError::Rejected(401));
    assert!(err.requires_reauth());
}

#[tokio::test]
async fn unsuccessful_profile_envelope_is_a_rejection() {
    let app = Router::new().route(
        "/api/profile",
        get(|| async { Json(json!({"success": false, "message": "User not found"})) }),
    );
    let base_url = spawn_server(app).await;

    let err = remote(&base_url)
        .with_profile_path("/profile")
        .expect("profile path")
        .fetch_profile("t1")
        .await
        .expect_err("must fail");
    assert_eq!(err, AuthError::Rejected(200));
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let err = remote(&format!("http://{addr}/api"))
        .fetch_profile("t1")
        .await
        .expect_err("must fail");
    assert!(matches!(err, AuthError::Unreachable(_)), "unexpected: {err:?}");
    assert!(!err.requires_reauth());
}

#[tokio::test]
async fn slow_server_times_out_as_unreachable() {
    let app = Router::new().route(
        "/api/user/me",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({"success": true, "data": {"username": "late"}}))
        }),
    );
    let base_url = spawn_server(app).await;
    let remote =
        HttpAuthRemote::new(&base_url, Some(Duration::from_millis(100))).expect("remote");

    let err = remote.fetch_profile("t1").await.expect_err("must time out");
    assert!(matches!(err, AuthError::Unreachable(_)), "unexpected: {err:?}");
}

#[test]
fn base_url_keeps_its_path_prefix() {
    let remote = remote("http://localhost:8080/api");
    assert_eq!(remote.base_url().as_str(), "http://localhost:8080/api/");
    assert_eq!(
        remote.login_url().as_str(),
        "http://localhost:8080/api/auth/login"
    );
    assert_eq!(
        remote.profile_url().as_str(),
        "http://localhost:8080/api/user/me"
    );
}

#[test]
fn profile_path_is_checked_when_configured() {
    let configured = remote("http://localhost:8080/api")
        .with_profile_path("/users/current")
        .expect("relative path");
    assert_eq!(
        configured.profile_url().as_str(),
        "http://localhost:8080/api/users/current"
    );

    assert!(remote("http://localhost:8080/api")
        .with_profile_path("https://elsewhere.example/me")
        .is_err());
}

#[test]
fn non_http_base_url_is_refused() {
    assert!(HttpAuthRemote::new("ftp://localhost/api", None).is_err());
    assert!(HttpAuthRemote::new("not a url", None).is_err());
}
