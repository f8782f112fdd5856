use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    inventory::{HistoryGroup, InventoryView},
    model::{EsimStatus, EsimUpdate},
    share::{SharedEsim, resolve_share, share_link},
    state::AppState,
    web::{ApiResponse, IdList, session::StoreSession},
};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Affected {
    pub affected: u64,
}

#[derive(Debug, Serialize)]
pub struct BulkStatusResult {
    pub updated: u64,
    pub skipped: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResult {
    pub deleted: u64,
    pub skipped: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct ShareLink {
    pub link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEsimRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "customer_name")]
    pub customer_name: Option<String>,
    #[serde(default, alias = "customer_contact")]
    pub customer_contact: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    pub ids: IdList,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "customer_name")]
    pub customer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: IdList,
}

#[derive(Debug, Deserialize)]
pub struct ShareQuery {
    #[serde(default)]
    pub ids: Option<String>,
}

/// Missing or blank status means UNUSED, as the inventory forms submit it.
fn status_or_unused(raw: Option<&str>) -> AppResult<EsimStatus> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|err: crate::model::UnknownStatus| AppError::validation(err.to_string())),
        None => Ok(EsimStatus::Unused),
    }
}

pub async fn healthcheck() -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::new(HealthStatus { status: "ok" }))
}

pub async fn list_esims(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
) -> AppResult<Json<ApiResponse<InventoryView>>> {
    let view = state.engine.view(&identity).await?;
    Ok(Json(ApiResponse::new(view)))
}

pub async fn history(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
) -> AppResult<Json<ApiResponse<Vec<HistoryGroup>>>> {
    let groups = state.engine.history_groups(&identity).await?;
    Ok(Json(ApiResponse::new(groups)))
}

pub async fn update_esim(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateEsimRequest>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    if id <= 0 {
        return Err(AppError::validation("eSIM id must be positive"));
    }

    let update = EsimUpdate {
        id,
        status: status_or_unused(payload.status.as_deref())?,
        customer_name: payload.customer_name,
        customer_contact: payload.customer_contact,
        notes: payload.notes,
    };

    let affected = state.engine.update(&identity, update).await?;
    Ok(Json(ApiResponse::new(Affected { affected })))
}

pub async fn revert_esim(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Affected>>> {
    if id <= 0 {
        return Err(AppError::validation("eSIM id must be positive"));
    }

    let affected = state.engine.revert(&identity, id).await?;
    Ok(Json(ApiResponse::new(Affected { affected })))
}

pub async fn bulk_status(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Json(payload): Json<BulkStatusRequest>,
) -> AppResult<Json<ApiResponse<BulkStatusResult>>> {
    let status = status_or_unused(payload.status.as_deref())?;
    let outcome = state
        .engine
        .bulk_set_status(&identity, &payload.ids.into_ids(), status, payload.customer_name)
        .await?;

    Ok(Json(ApiResponse::new(BulkStatusResult {
        updated: outcome.affected,
        skipped: outcome.skipped,
    })))
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    StoreSession(identity): StoreSession,
    Json(payload): Json<IdsRequest>,
) -> AppResult<Json<ApiResponse<BulkDeleteResult>>> {
    let outcome = state
        .engine
        .delete_many(&identity, &payload.ids.into_ids())
        .await?;

    Ok(Json(ApiResponse::new(BulkDeleteResult {
        deleted: outcome.affected,
        skipped: outcome.skipped,
    })))
}

pub async fn create_share_link(
    StoreSession(_identity): StoreSession,
    Json(payload): Json<IdsRequest>,
) -> AppResult<Json<ApiResponse<ShareLink>>> {
    let ids = payload.ids.into_ids();
    if !ids.iter().any(|id| *id > 0) {
        return Err(AppError::validation("at least one eSIM id is required"));
    }

    Ok(Json(ApiResponse::new(ShareLink {
        link: share_link(&ids),
    })))
}

/// Public view of shared records. No session needed.
pub async fn share_view(
    State(state): State<AppState>,
    Query(query): Query<ShareQuery>,
) -> AppResult<Json<ApiResponse<Vec<SharedEsim>>>> {
    let raw_ids = query.ids.unwrap_or_default();
    let shared = resolve_share(state.store.as_ref(), &raw_ids).await?;
    Ok(Json(ApiResponse::new(shared)))
}
