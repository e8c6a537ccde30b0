//! `POST /approvals/{callId}` — resolve a pending approval (§6).

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};

use crate::error::AppError;
use crate::types::{ResolveApprovalRequest, ResolveApprovalResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:call_id", post(resolve_approval))
}

async fn resolve_approval(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(body): Json<ResolveApprovalRequest>,
) -> Result<Json<ResolveApprovalResponse>, AppError> {
    if !state.approvals.resolve(&call_id, body.decision) {
        return Err(AppError::NotFound(format!("unknown or already-resolved approval \"{call_id}\"")));
    }
    Ok(Json(ResolveApprovalResponse { call_id, decision: body.decision }))
}
