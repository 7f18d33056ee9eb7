use axum::extract::{Path, State};
use axum::response::Json;

use crate::error::AppError;
use crate::ledger::{ChainVerification, LedgerEntry};
use crate::routes::AppState;

pub async fn list_ledger(
    State(state): State<AppState>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.ledger.list_all().await?))
}

pub async fn ledger_by_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.ledger.list_by_entity(&entity).await?))
}

/// On-demand integrity walk over the whole chain. A broken chain is a
/// result value here, not an error.
pub async fn verify_ledger(
    State(state): State<AppState>,
) -> Result<Json<ChainVerification>, AppError> {
    Ok(Json(state.ledger.verify_chain().await?))
}
