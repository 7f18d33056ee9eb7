use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::warn;

use crate::access::{self, Role};
use crate::auth::Caller;
use crate::error::AppError;
use crate::history::PatientHistoryRecord;
use crate::ledger::NewLedgerEntry;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHistoryRequest {
    pub patient: Option<String>,
    pub hospital: Option<String>,
    pub details: Option<String>,
}

pub async fn patient_history(
    State(state): State<AppState>,
    caller: Caller,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<PatientHistoryRecord>>, AppError> {
    if let Err(denial) =
        access::authorize_history_read(&caller, &patient_id, &state.consents).await
    {
        warn!(caller = %caller.username, patient = %patient_id, "history read denied");
        return Err(denial);
    }
    Ok(Json(state.history.for_patient(&patient_id).await?))
}

/// Create a history record: doctor-authored (consent-gated, ledger type
/// `Record Created`) or patient self-report (ledger type `Self Report`,
/// actor `self`). The gate runs before anything is written; a denial
/// leaves no record and no ledger entry.
pub async fn create_history(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateHistoryRequest>,
) -> Result<(StatusCode, Json<PatientHistoryRecord>), AppError> {
    let details = req
        .details
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("Details are required".to_string()))?;

    let grant =
        match access::authorize_history_write(&caller, req.patient.as_deref(), &state.consents)
            .await
        {
            Ok(grant) => grant,
            Err(denial) => {
                warn!(caller = %caller.username, "history write denied");
                return Err(denial);
            }
        };

    let hospital = resolve_hospital(&state, &grant.doctor, grant.self_report, req.hospital).await?;

    let record = state
        .history
        .create(&grant.patient, &grant.doctor, &hospital, &details)
        .await?;

    let (entry_type, by) = if grant.self_report {
        ("Self Report", "self".to_string())
    } else {
        ("Record Created", caller.username.clone())
    };

    state
        .ledger
        .append(NewLedgerEntry {
            entry_type: entry_type.to_string(),
            entity: grant.patient.clone(),
            by,
            hospital,
            details: Some(details),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn all_histories(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<PatientHistoryRecord>>, AppError> {
    if caller.role != Role::Admin {
        return Err(AppError::Forbidden(
            "Only admins may list all histories".to_string(),
        ));
    }
    Ok(Json(state.history.all().await?))
}

/// Hospital for the record: the request body wins, otherwise the author's
/// profile (doctor's affiliation, or the patient's own hospital for a
/// self-report).
async fn resolve_hospital(
    state: &AppState,
    author: &str,
    self_report: bool,
    requested: Option<String>,
) -> Result<String, AppError> {
    if let Some(hospital) = requested.filter(|h| !h.is_empty()) {
        return Ok(hospital);
    }
    if self_report {
        let profile = state.directory.find_patient(author).await?;
        profile
            .map(|p| p.hospital)
            .ok_or_else(|| AppError::Validation("Hospital is required".to_string()))
    } else {
        let profile = state.directory.find_doctor(author).await?;
        profile
            .map(|d| d.hospital)
            .ok_or_else(|| AppError::NotFound("Doctor profile not found".to_string()))
    }
}
