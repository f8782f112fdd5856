use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use esim_stock::{
    build_router,
    clock::ManualClock,
    config::{AppConfig, DatabaseBackend},
    state::AppState,
    storage::InMemoryInventoryStore,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: axum::Router,
    state: AppState,
    _uploads: TempDir,
}

fn app() -> TestApp {
    let uploads = tempfile::tempdir().expect("temp dir should be created");
    let config = AppConfig {
        database_backend: DatabaseBackend::Memory,
        upload_path: Some(uploads.path().to_path_buf()),
        cron_secret: Some("tick".into()),
        ..AppConfig::default()
    };
    let state = AppState::new(
        config,
        Arc::new(InMemoryInventoryStore::new()),
        Arc::new(ManualClock::new(Utc::now())),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        _uploads: uploads,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    content_type: Option<&str>,
    body: Body,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    let request = builder.body(body).expect("request should build");

    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    let json = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    (status, headers, json)
}

async fn send_json(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    payload: Value,
) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        method,
        uri,
        token,
        Some("application/json"),
        Body::from(payload.to_string()),
    )
    .await;
    (status, body)
}

async fn send_form(app: &TestApp, uri: &str, token: &str, form: &str) -> (StatusCode, String) {
    let (status, headers, _) = send(
        app,
        Method::POST,
        uri,
        Some(token),
        Some("application/x-www-form-urlencoded"),
        Body::from(form.to_string()),
    )
    .await;
    (status, location(&headers))
}

fn location(headers: &HeaderMap) -> String {
    headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn admin_token(app: &TestApp) -> String {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/admin/login",
        None,
        json!({"email": "admin@esim.local", "password": "admin123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn provision_and_login(app: &TestApp, name: &str, slug: &str) -> String {
    let admin = admin_token(app).await;
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/admin/stores",
        Some(&admin),
        json!({"name": name, "slug": slug, "password": "pw-123"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/login",
        None,
        json!({"slug": slug, "password": "pw-123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["token"].as_str().unwrap().to_string()
}

async fn stock_ids(app: &TestApp, token: &str) -> Vec<i64> {
    let (status, _, body) = send(app, Method::GET, "/api/esims", Some(token), None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["in_stock"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, _, body) = send(&app, Method::GET, "/health", None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn store_routes_redirect_without_session() {
    let app = app();
    let (status, headers, _) = send(&app, Method::GET, "/api/esims", None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/login");

    let (status, headers, _) =
        send(&app, Method::GET, "/api/admin/stores", None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/admin/login");
}

#[tokio::test]
async fn login_sets_session_cookie_and_rejects_bad_passwords() {
    let app = app();
    provision_and_login(&app, "Tokyo Shop", "Tokyo Shop").await;

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some("application/json"),
        Body::from(json!({"slug": "tokyo-shop", "password": "pw-123"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("esim-session="));
    assert_eq!(body["data"]["identity"]["store_name"], json!("Tokyo Shop"));

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/login",
        None,
        json!({"slug": "tokyo-shop", "password": "wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], json!(false));
}

#[tokio::test]
async fn duplicate_slug_is_a_validation_error() {
    let app = app();
    provision_and_login(&app, "Shop", "shop").await;
    let admin = admin_token(&app).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/admin/stores",
        Some(&admin),
        json!({"name": "Other", "slug": "SHOP", "password": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("validation_error"));
}

#[tokio::test]
async fn ship_share_import_and_revert_flow() {
    let app = app();
    let seller = provision_and_login(&app, "Seller", "seller").await;
    let buyer = provision_and_login(&app, "Buyer", "buyer").await;

    let (status, target) = send_form(
        &app,
        "/new/urls",
        &seller,
        "country=JP&planName=10GB&qrUrls=https%3A%2F%2Fq%2F1.png%0A%0Ahttps%3A%2F%2Fq%2F2.png",
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(target, "/new?uploaded=2");

    let ids = stock_ids(&app, &seller).await;
    assert_eq!(ids.len(), 2);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/esims/bulk-status",
        Some(&seller),
        json!({"ids": format!("{},{}", ids[0], ids[1]), "status": "CUSTOMER", "customerName": "Ann"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["updated"], json!(2));

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/share-links",
        Some(&seller),
        json!({"ids": ids}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let link = body["data"]["link"].as_str().unwrap().to_string();

    let (status, _, shared) = send(&app, Method::GET, &link, None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let shared = shared["data"].as_array().unwrap();
    assert_eq!(shared.len(), 2);
    assert!(shared[0].get("customer_name").is_none());
    assert!(shared[0].get("cost_price").is_none());

    let pasted = format!("shareUrl={}", link.replace('?', "%3F").replace('=', "%3D").replace(',', "%2C"));
    let (status, target) = send_form(&app, "/new/share", &buyer, &pasted).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(target, "/new?uploaded=2");
    assert_eq!(stock_ids(&app, &buyer).await.len(), 2);

    // The buyer cannot touch the seller's originals.
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/esims/bulk-delete",
        Some(&buyer),
        json!({"ids": ids}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], json!(0));

    let (status, _, history) =
        send(&app, Method::GET, "/api/history", Some(&seller), None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"][0]["customer"], json!("Ann"));

    let (status, _, body) = send(
        &app,
        Method::POST,
        &format!("/api/esims/{}/revert", ids[0]),
        Some(&seller),
        None,
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["affected"], json!(1));
    assert_eq!(stock_ids(&app, &seller).await, vec![ids[0]]);
}

#[tokio::test]
async fn share_view_with_unknown_ids_is_not_found() {
    let app = app();
    let (status, _, body) =
        send(&app, Method::GET, "/share?ids=999,abc", None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test]
async fn multipart_upload_stores_qr_images() {
    let app = app();
    let token = provision_and_login(&app, "Shop", "shop").await;

    let boundary = "esimboundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"country\"\r\n\r\nKR\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"qrFiles\"; filename=\"one.png\"\r\n\
         Content-Type: image/png\r\n\r\nPNGDATA\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"qrFiles\"; filename=\"\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n\r\n\
         --{b}--\r\n",
        b = boundary
    );
    let (status, headers, _) = send(
        &app,
        Method::POST,
        "/new/files",
        Some(&token),
        Some(&format!("multipart/form-data; boundary={boundary}")),
        Body::from(body),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/new?uploaded=1");

    let (_, _, listing) = send(&app, Method::GET, "/api/esims", Some(&token), None, Body::empty()).await;
    let record = &listing["data"]["in_stock"][0];
    assert_eq!(record["country"], json!("KR"));
    let qr_path = record["qr_path"].as_str().unwrap().to_string();
    assert!(qr_path.starts_with("/api/qr/"));

    let (status, headers, _) = send(&app, Method::GET, &qr_path, None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/png");
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=86400"
    );

    let (status, _, _) = send(&app, Method::GET, "/api/qr/missing.png", None, None, Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cron_requires_the_shared_secret() {
    let app = app();
    let (status, _, _) = send(
        &app,
        Method::GET,
        "/api/cron/cleanup-history",
        Some("nope"),
        None,
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/cron/cleanup-history?secret=tick",
        None,
        None,
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], json!(0));
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let app = app();
    let token = provision_and_login(&app, "Shop", "shop").await;
    let open_sessions = app.state.sessions.len().await;

    let (status, headers, _) = send(
        &app,
        Method::POST,
        "/api/auth/logout?next=admin/login",
        Some(&token),
        None,
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location(&headers), "/admin/login");
    assert_eq!(app.state.sessions.len().await, open_sessions - 1);

    let (status, _, _) = send(&app, Method::GET, "/api/esims", Some(&token), None, Body::empty()).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn logout_never_redirects_off_site() {
    let app = app();
    for next in ["%2F%5Cevil.example", "%5Cevil.example", "%2F%2Fevil.example"] {
        let (status, headers, _) = send(
            &app,
            Method::POST,
            &format!("/api/auth/logout?next={next}"),
            None,
            None,
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/login", "next={next}");
    }
}

#[tokio::test]
async fn admin_resets_store_password() {
    let app = app();
    provision_and_login(&app, "Shop", "shop").await;
    let admin = admin_token(&app).await;

    let (_, _, stores) =
        send(&app, Method::GET, "/api/admin/stores", Some(&admin), None, Body::empty()).await;
    let store_id = stores["data"][0]["id"].as_i64().unwrap();
    assert!(stores["data"][0].get("password_hash").is_none());

    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/api/admin/stores/{store_id}/password"),
        Some(&admin),
        json!({"password": "a", "confirm": "b"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::POST,
        &format!("/api/admin/stores/{store_id}/password"),
        Some(&admin),
        json!({"password": "fresh", "confirm": "fresh"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/login",
        None,
        json!({"slug": "shop", "password": "fresh"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
