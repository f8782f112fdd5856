use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};

use crate::identity::IdentityContext;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "esim-session";
pub const STORE_LOGIN_PATH: &str = "/login";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

/// Session token from the `esim-session` cookie, or from `Authorization: Bearer`.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.trim().strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(token: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}"
    ))
    .ok()
}

pub fn expired_session_cookie() -> HeaderValue {
    HeaderValue::from_static("esim-session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

async fn resolve_identity(parts: &Parts, state: &AppState) -> Option<IdentityContext> {
    let token = session_token(&parts.headers)?;
    state.sessions.resolve(&token, state.clock.now()).await
}

/// A logged-in store. Anything else is sent to the store login page.
#[derive(Debug, Clone)]
pub struct StoreSession(pub IdentityContext);

impl FromRequestParts<AppState> for StoreSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve_identity(parts, state).await {
            Some(identity) if identity.is_store() => Ok(Self(identity)),
            _ => Err(Redirect::to(STORE_LOGIN_PATH).into_response()),
        }
    }
}

/// A logged-in admin.
#[derive(Debug, Clone)]
pub struct AdminSession(pub IdentityContext);

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match resolve_identity(parts, state).await {
            Some(identity) if identity.admin => Ok(Self(identity)),
            _ => Err(Redirect::to(ADMIN_LOGIN_PATH).into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_from_cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; esim-session=abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));

        headers.remove(header::COOKIE);
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(session_token(&headers), None);
    }
}
