use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use leadreg_core::engine::{self, BulkCheckItem};
use leadreg_core::error::ApiError;
use leadreg_core::matching::DuplicateCandidate;
use leadreg_core::IdentityProfile;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/duplicates/check", post(check_duplicates))
        .route("/v1/duplicates/check/batch", post(bulk_check_duplicates))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DuplicateCheckRequest {
    pub profile: IdentityProfile,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DuplicateCheckResponse {
    /// Candidates above the significance threshold, strongest first.
    /// Empty means no duplicates found — not an error.
    pub duplicates: Vec<DuplicateCandidate>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BulkDuplicateCheckRequest {
    pub profiles: Vec<IdentityProfile>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct BulkDuplicateCheckResponse {
    /// One entry per submitted profile, in request order. Items fail in
    /// isolation; a bad profile never aborts the batch.
    pub results: Vec<BulkCheckItem>,
}

/// Check one identity profile against the active lead population
///
/// A profile without usable identity fields yields an empty result, not
/// an error.
#[utoipa::path(
    post,
    path = "/v1/duplicates/check",
    request_body = DuplicateCheckRequest,
    responses(
        (status = 200, description = "Candidates, possibly empty", body = DuplicateCheckResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "duplicates"
)]
pub async fn check_duplicates(
    State(state): State<AppState>,
    Json(req): Json<DuplicateCheckRequest>,
) -> Result<Json<DuplicateCheckResponse>, AppError> {
    let duplicates = engine::check_duplicates(&state.store, &req.profile, &state.config).await?;
    Ok(Json(DuplicateCheckResponse { duplicates }))
}

/// Check a batch of identity profiles in one pass
///
/// Capped batch size; per-item error isolation. The response is 200 even
/// when individual profiles fail.
#[utoipa::path(
    post,
    path = "/v1/duplicates/check/batch",
    request_body = BulkDuplicateCheckRequest,
    responses(
        (status = 200, description = "Per-profile results", body = BulkDuplicateCheckResponse),
        (status = 400, description = "Empty or oversized batch", body = ApiError)
    ),
    tag = "duplicates"
)]
pub async fn bulk_check_duplicates(
    State(state): State<AppState>,
    Json(req): Json<BulkDuplicateCheckRequest>,
) -> Result<Json<BulkDuplicateCheckResponse>, AppError> {
    let results =
        engine::bulk_check_duplicates(&state.store, &req.profiles, &state.config).await?;
    Ok(Json(BulkDuplicateCheckResponse { results }))
}
