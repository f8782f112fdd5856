//! JSON HTTP surface.
//!
//! Store routes resolve a [`StoreSession`](session::StoreSession) and hand its
//! identity to the engine; admin routes require an
//! [`AdminSession`](session::AdminSession). Form-driven intake routes answer
//! with redirects the way the browser flows expect.

pub mod admin;
pub mod handlers;
pub mod intake;
pub mod session;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::share::parse_id_list;
use crate::state::AppState;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Ids as a form-style `"1,2,3"` string or as a JSON array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdList {
    Csv(String),
    List(Vec<i64>),
}

impl IdList {
    pub fn into_ids(self) -> Vec<i64> {
        match self {
            Self::Csv(raw) => parse_id_list(&raw),
            Self::List(ids) => ids,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload_limit_bytes;

    Router::new()
        .route("/health", get(handlers::healthcheck))
        .route("/api/login", post(admin::store_login))
        .route("/api/admin/login", post(admin::admin_login))
        .route("/api/auth/logout", get(admin::logout).post(admin::logout))
        .route("/api/esims", get(handlers::list_esims))
        .route("/api/history", get(handlers::history))
        .route("/api/esims/bulk-status", post(handlers::bulk_status))
        .route("/api/esims/bulk-delete", post(handlers::bulk_delete))
        .route("/api/esims/{id}", post(handlers::update_esim))
        .route("/api/esims/{id}/revert", post(handlers::revert_esim))
        .route("/api/share-links", post(handlers::create_share_link))
        .route("/share", get(handlers::share_view))
        .route("/new/files", post(intake::upload_files))
        .route("/new/urls", post(intake::create_from_urls))
        .route("/new/share", post(intake::import_share))
        .route("/api/qr/{*path}", get(intake::serve_qr))
        .route(
            "/api/admin/stores",
            get(admin::list_stores).post(admin::create_store),
        )
        .route(
            "/api/admin/stores/{id}/password",
            post(admin::change_password),
        )
        .route(
            "/api/cron/cleanup-history",
            get(intake::cleanup_history).post(intake::cleanup_history),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::IdList;

    #[test]
    fn ids_accept_csv_or_array() {
        let csv: IdList = serde_json::from_str("\"3, 4,x\"").unwrap();
        assert_eq!(csv.into_ids(), vec![3, 4]);

        let list: IdList = serde_json::from_str("[5,6]").unwrap();
        assert_eq!(list.into_ids(), vec![5, 6]);
    }
}
