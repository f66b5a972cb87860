use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use leadreg_core::engine::{self, MergeRequest, MergeResult, RestoredRecord};
use leadreg_core::error::ApiError;
use leadreg_core::leads::MergeAuditRecord;
use leadreg_core::MergePreview;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/leads/merge/preview", post(preview_merge))
        .route("/v1/leads/merge", post(execute_merge))
        .route("/v1/leads/merge/undo", post(undo_merge))
}

/// Temporary: extract the acting user from a header until auth is wired.
/// In production, this comes from the authenticated API key's user.
fn extract_user_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let header_val = headers
        .get("x-user-id")
        .ok_or_else(|| AppError::Validation {
            message: "x-user-id header is required (temporary, will be replaced by auth)"
                .to_string(),
            field: Some("headers.x-user-id".to_string()),
            received: None,
            docs_hint: Some(
                "Pass x-user-id as a UUID header. Merges and undos are attributed to this user."
                    .to_string(),
            ),
        })?;

    let user_id_str = header_val.to_str().map_err(|_| AppError::Validation {
        message: "x-user-id must be a valid UTF-8 string".to_string(),
        field: Some("headers.x-user-id".to_string()),
        received: None,
        docs_hint: None,
    })?;

    Uuid::parse_str(user_id_str).map_err(|_| AppError::Validation {
        message: "x-user-id must be a valid UUID".to_string(),
        field: Some("headers.x-user-id".to_string()),
        received: Some(serde_json::Value::String(user_id_str.to_string())),
        docs_hint: Some(
            "Use a valid UUIDv4 or UUIDv7, e.g. 'a1b2c3d4-e5f6-7890-abcd-ef1234567890'"
                .to_string(),
        ),
    })
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MergePreviewRequest {
    pub source_id: Uuid,
    pub target_id: Uuid,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UndoMergeRequest {
    /// The surviving record of the merge being reversed.
    pub target_id: Uuid,
    /// The snapshot taken when the merge ran. The restored record gets a
    /// fresh id — callers must switch to it.
    pub snapshot: MergeAuditRecord,
}

/// Compute the field-by-field merge plan for a candidate pair
///
/// Advisory and read-only: recomputed on every call, never cached. Feed
/// the (possibly edited) decisions into the merge endpoint to execute.
#[utoipa::path(
    post,
    path = "/v1/leads/merge/preview",
    request_body = MergePreviewRequest,
    responses(
        (status = 200, description = "Merge plan", body = MergePreview),
        (status = 400, description = "source and target are the same record", body = ApiError),
        (status = 404, description = "Unknown or inactive lead", body = ApiError)
    ),
    tag = "merge"
)]
pub async fn preview_merge(
    State(state): State<AppState>,
    Json(req): Json<MergePreviewRequest>,
) -> Result<Json<MergePreview>, AppError> {
    let preview =
        engine::preview_merge(&state.store, req.source_id, req.target_id, &state.config).await?;
    Ok(Json(preview))
}

/// Execute an approved merge
///
/// Consolidates the source into the target: applies the field decisions,
/// snapshots the source (unless preserve_source_data is false), migrates
/// its activities and tasks, retires it, and writes an audit entry on the
/// target. A failure at any step compensates everything already done.
#[utoipa::path(
    post,
    path = "/v1/leads/merge",
    request_body = MergeRequest,
    responses(
        (status = 200, description = "Merge outcome", body = MergeResult),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Unknown or inactive lead", body = ApiError)
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "Acting user (temporary, replaced by auth)")
    ),
    tag = "merge"
)]
pub async fn execute_merge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MergeRequest>,
) -> Result<Json<MergeResult>, AppError> {
    let merged_by = extract_user_id(&headers)?;
    let result = engine::execute_merge(&state.store, &state.store, &req, merged_by).await?;
    Ok(Json(result))
}

/// Reverse a merge from its snapshot
///
/// Best-effort reconstruction, not in-place restoration: the pre-merge
/// state comes back under a new lead id, and dependents migrated by that
/// merge are reclaimed onto it.
#[utoipa::path(
    post,
    path = "/v1/leads/merge/undo",
    request_body = UndoMergeRequest,
    responses(
        (status = 200, description = "Restored record", body = RestoredRecord),
        (status = 400, description = "Malformed snapshot", body = ApiError),
        (status = 404, description = "Unknown target lead", body = ApiError)
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "Acting user (temporary, replaced by auth)")
    ),
    tag = "merge"
)]
pub async fn undo_merge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UndoMergeRequest>,
) -> Result<Json<RestoredRecord>, AppError> {
    let undone_by = extract_user_id(&headers)?;
    let restored = engine::undo_merge(
        &state.store,
        &state.store,
        req.target_id,
        &req.snapshot,
        undone_by,
    )
    .await?;
    Ok(Json(restored))
}
