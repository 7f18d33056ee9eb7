//! Role-based authorization for patient history.
//!
//! Roles are a closed set; each operation on patient history has one
//! policy function that takes the caller's role and decides the outcome,
//! so the rules live here instead of being scattered across handlers.

use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::consent::ConsentStore;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "patient" => Some(Role::Patient),
            _ => None,
        }
    }
}

/// Outcome of a permitted history write: which identities go on the
/// record, and which ledger entry type the write must append.
#[derive(Debug, Clone)]
pub struct HistoryWriteGrant {
    pub patient: String,
    pub doctor: String,
    pub self_report: bool,
}

/// Read policy: admins see everything, patients see themselves, doctors
/// need consent, anyone else is denied.
pub async fn authorize_history_read(
    caller: &Caller,
    patient: &str,
    consents: &ConsentStore,
) -> Result<(), AppError> {
    match caller.role {
        Role::Admin => Ok(()),
        Role::Patient => {
            if caller.username == patient {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "Patients may only view their own history".to_string(),
                ))
            }
        }
        Role::Doctor => {
            if consents.check_consent(patient, &caller.username).await? {
                Ok(())
            } else {
                Err(AppError::Forbidden(
                    "No consent to view this patient history".to_string(),
                ))
            }
        }
    }
}

/// Write policy: doctors need consent for the named patient; patients may
/// self-report, in which case the record's doctor identity is their own.
pub async fn authorize_history_write(
    caller: &Caller,
    patient: Option<&str>,
    consents: &ConsentStore,
) -> Result<HistoryWriteGrant, AppError> {
    match caller.role {
        Role::Doctor => {
            let patient = patient
                .filter(|p| !p.is_empty())
                .ok_or_else(|| AppError::Validation("Patient is required".to_string()))?;
            if !consents.check_consent(patient, &caller.username).await? {
                return Err(AppError::Forbidden(
                    "No consent to add history for this patient".to_string(),
                ));
            }
            Ok(HistoryWriteGrant {
                patient: patient.to_string(),
                doctor: caller.username.clone(),
                self_report: false,
            })
        }
        Role::Patient => Ok(HistoryWriteGrant {
            patient: caller.username.clone(),
            doctor: caller.username.clone(),
            self_report: true,
        }),
        Role::Admin => Err(AppError::Forbidden(
            "Only doctors or patients can create history".to_string(),
        )),
    }
}
