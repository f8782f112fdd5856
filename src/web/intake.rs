//! Stock intake forms, QR image serving and the retention trigger.

use axum::{
    Form, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    ingest::{BatchFields, UploadedQr, content_type_for},
    retention::{RETENTION_DAYS, secret_matches},
    state::AppState,
    web::{ApiResponse, session::StoreSession},
};

const NEW_PAGE: &str = "/new";
const QR_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlBatchForm {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, alias = "plan_name")]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "qr_urls", alias = "urls")]
    pub qr_urls: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareImportForm {
    #[serde(default, alias = "share_url", alias = "links")]
    pub share_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CronQuery {
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub deleted: u64,
    pub message: String,
}

/// Back to the intake page with either the created count or an error flag.
fn intake_redirect(result: AppResult<usize>, source: &'static str) -> Response {
    match result {
        Ok(created) => Redirect::to(&format!("{NEW_PAGE}?uploaded={created}")).into_response(),
        Err(err) => {
            if err.is_infrastructure() {
                tracing::error!(source, error = %err, "stock intake failed");
            } else {
                tracing::warn!(source, error = %err, "stock intake rejected");
            }
            Redirect::to(&format!("{NEW_PAGE}?error=upload")).into_response()
        }
    }
}

async fn read_upload_form(mut multipart: Multipart) -> AppResult<(BatchFields, Vec<UploadedQr>)> {
    let mut fields = BatchFields::default();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::upload(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        if let Some(file_name) = file_name {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::upload(err.to_string()))?;
            // Browsers send an empty part when no file was picked.
            if !bytes.is_empty() {
                files.push(UploadedQr {
                    file_name: Some(file_name),
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| AppError::upload(err.to_string()))?;
        match name.as_str() {
            "country" => fields.country = Some(value),
            "planName" | "plan_name" => fields.plan_name = Some(value),
            "notes" => fields.notes = Some(value),
            _ => {}
        }
    }

    Ok((fields, files))
}

pub async fn upload_files(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    multipart: Multipart,
) -> Response {
    let result = async {
        let store_id = identity
            .store_id
            .ok_or_else(|| AppError::unauthorized("store session required"))?;
        let (fields, files) = read_upload_form(multipart).await?;
        state.ingest.create_from_files(store_id, &fields, &files).await
    }
    .await;

    intake_redirect(result, "files")
}

pub async fn create_from_urls(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Form(form): Form<UrlBatchForm>,
) -> Response {
    let result = async {
        let store_id = identity
            .store_id
            .ok_or_else(|| AppError::unauthorized("store session required"))?;
        let fields = BatchFields {
            country: form.country,
            plan_name: form.plan_name,
            notes: form.notes,
        };
        state
            .ingest
            .create_from_urls(store_id, &fields, &form.qr_urls)
            .await
    }
    .await;

    intake_redirect(result, "urls")
}

pub async fn import_share(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Form(form): Form<ShareImportForm>,
) -> Response {
    let result = async {
        let store_id = identity
            .store_id
            .ok_or_else(|| AppError::unauthorized("store session required"))?;
        state.ingest.import_share_links(store_id, &form.share_url).await
    }
    .await;

    intake_redirect(result, "share")
}

pub async fn serve_qr(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let bytes = state
        .ingest
        .qr_storage()
        .read(&path)
        .await?
        .ok_or_else(|| AppError::not_found("QR image not found"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&path)),
            (header::CACHE_CONTROL, QR_CACHE_CONTROL),
        ],
        bytes,
    )
        .into_response())
}

/// Scheduled trigger for the retention sweep.
pub async fn cleanup_history(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<SweepReport>>> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        return Err(AppError::internal("CRON_SECRET is not configured"));
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !secret_matches(secret, authorization, query.secret.as_deref()) {
        return Err(AppError::unauthorized("invalid cron secret"));
    }

    let deleted = state.sweeper.sweep().await?;
    Ok(Json(ApiResponse::new(SweepReport {
        deleted,
        message: format!("deleted {deleted} shipped eSIMs older than {RETENTION_DAYS} days"),
    })))
}
