//! Login, logout and admin store provisioning.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::{AppError, AppResult},
    identity::IdentityContext,
    model::Store,
    share::PLACEHOLDER_ORIGIN,
    state::AppState,
    web::{
        ApiResponse,
        session::{AdminSession, STORE_LOGIN_PATH, expired_session_cookie, session_cookie, session_token},
    },
};

#[derive(Debug, Deserialize)]
pub struct StoreLoginRequest {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionOpened {
    pub token: String,
    pub identity: IdentityContext,
}

#[derive(Debug, Deserialize)]
pub struct LogoutQuery {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordChanged {
    pub store_id: i64,
}

async fn open_session(state: &AppState, identity: IdentityContext) -> AppResult<Response> {
    let token = state
        .sessions
        .open(identity.clone(), state.clock.now())
        .await;
    let cookie = session_cookie(&token, state.sessions.ttl().num_seconds())
        .ok_or_else(|| AppError::internal("session token is not a valid header value"))?;

    let body = Json(ApiResponse::new(SessionOpened { token, identity }));
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

pub async fn store_login(
    State(state): State<AppState>,
    Json(payload): Json<StoreLoginRequest>,
) -> AppResult<Response> {
    if payload.slug.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("slug and password are required"));
    }

    let store = state
        .accounts
        .verify_store(&payload.slug, &payload.password)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid store or password"))?;

    tracing::info!(store_id = store.id, "store logged in");
    open_session(&state, IdentityContext::store(store.id, store.name)).await
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLoginRequest>,
) -> AppResult<Response> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("email and password are required"));
    }

    if !state.accounts.verify_admin(&payload.email, &payload.password) {
        return Err(AppError::unauthorized("invalid email or password"));
    }

    tracing::info!("admin logged in");
    open_session(&state, IdentityContext::admin()).await
}

/// `next` always becomes a same-site path.
fn logout_target(next: Option<&str>) -> String {
    let Some(next) = next.map(str::trim).filter(|value| !value.is_empty()) else {
        return STORE_LOGIN_PATH.to_string();
    };
    let path = if next.starts_with('/') {
        next.to_string()
    } else {
        format!("/{next}")
    };

    // Browsers read `/\host` as `//host`.
    if path.starts_with("//") || path.contains('\\') || path.chars().any(char::is_control) {
        return STORE_LOGIN_PATH.to_string();
    }

    let base = Url::parse(PLACEHOLDER_ORIGIN).ok();
    let same_site = base
        .and_then(|base| base.join(&path).ok())
        .is_some_and(|resolved| resolved.host_str() == Some("localhost"));
    if same_site {
        path
    } else {
        STORE_LOGIN_PATH.to_string()
    }
}

pub async fn logout(
    State(state): State<AppState>,
    Query(query): Query<LogoutQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token).await;
    }

    let target = logout_target(query.next.as_deref());
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to(&target),
    )
        .into_response()
}

pub async fn list_stores(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
) -> AppResult<Json<ApiResponse<Vec<Store>>>> {
    let stores = state.accounts.list_stores().await?;
    Ok(Json(ApiResponse::new(stores)))
}

pub async fn create_store(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    Json(payload): Json<CreateStoreRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Store>>)> {
    let store = state
        .accounts
        .create_store_account(&payload.name, &payload.slug, &payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(store))))
}

pub async fn change_password(
    State(state): State<AppState>,
    AdminSession(_admin): AdminSession,
    Path(store_id): Path<i64>,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<PasswordChanged>>> {
    state
        .accounts
        .change_store_password(store_id, &payload.password, &payload.confirm)
        .await?;

    Ok(Json(ApiResponse::new(PasswordChanged { store_id })))
}
