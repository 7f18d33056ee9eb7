use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use tracing::info;

use crate::access::Role;
use crate::auth::Caller;
use crate::consent::{ConsentAction, ConsentRecord};
use crate::error::AppError;
use crate::ledger::NewLedgerEntry;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    #[serde(default)]
    pub patient: String,
    #[serde(default)]
    pub doctor: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub patient: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorQuery {
    pub doctor: Option<String>,
}

/// Patient-originated grant or revoke. Upserts the (patient, doctor)
/// record and appends one ledger entry for the transition.
pub async fn upsert_consent(
    State(state): State<AppState>,
    Json(req): Json<ConsentRequest>,
) -> Result<Json<ConsentRecord>, AppError> {
    if req.patient.is_empty() || req.doctor.is_empty() || req.action.is_empty() {
        return Err(AppError::Validation(
            "Patient, doctor, and action are required".to_string(),
        ));
    }
    let action = ConsentAction::parse(&req.action)
        .ok_or_else(|| AppError::Validation("Action must be Grant or Revoke".to_string()))?;

    let doctor = state
        .directory
        .find_doctor(&req.doctor)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))?;

    let record = state.consents.apply(&req.patient, &doctor, action).await?;

    state
        .ledger
        .append(NewLedgerEntry {
            entry_type: action.ledger_type().to_string(),
            entity: req.patient.clone(),
            by: doctor.display_name.clone(),
            hospital: doctor.hospital.clone(),
            details: Some(format!(
                "Patient {} {} consent to {} at {}",
                req.patient,
                action.past_tense(),
                doctor.display_name,
                doctor.hospital
            )),
        })
        .await?;

    info!(
        patient = %req.patient,
        doctor = %doctor.username,
        action = %req.action,
        "consent updated"
    );

    Ok(Json(record))
}

pub async fn consents_by_patient(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Vec<ConsentRecord>>, AppError> {
    let patient = query
        .patient
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("Patient parameter is required".to_string()))?;
    Ok(Json(state.consents.for_patient(&patient).await?))
}

pub async fn consents_by_doctor(
    State(state): State<AppState>,
    Query(query): Query<DoctorQuery>,
) -> Result<Json<Vec<ConsentRecord>>, AppError> {
    let doctor = query
        .doctor
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("Doctor parameter is required".to_string()))?;
    Ok(Json(state.consents.for_doctor(&doctor).await?))
}

pub async fn all_consents(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<ConsentRecord>>, AppError> {
    if caller.role != Role::Admin {
        return Err(AppError::Forbidden(
            "Only admins may list all consents".to_string(),
        ));
    }
    Ok(Json(state.consents.all().await?))
}
