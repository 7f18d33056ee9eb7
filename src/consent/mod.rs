//! Consent records and the consent check.
//!
//! One record per (patient, doctor) pair, two states. A doctor is
//! admitted either by a direct grant for the pair or by a hospital-wide
//! grant covering the doctor's affiliated hospital.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use chrono::Utc;

use crate::database::Database;
use crate::directory::{Directory, DoctorProfile};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsentStatus {
    Granted,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Granted => "Granted",
            ConsentStatus::Revoked => "Revoked",
        }
    }

    pub fn parse(s: &str) -> Option<ConsentStatus> {
        match s {
            "Granted" => Some(ConsentStatus::Granted),
            "Revoked" => Some(ConsentStatus::Revoked),
            _ => None,
        }
    }
}

/// Patient-originated transition. A doctor's "request" is a notification
/// only and never reaches this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentAction {
    Grant,
    Revoke,
}

impl ConsentAction {
    pub fn parse(s: &str) -> Option<ConsentAction> {
        match s {
            "Grant" => Some(ConsentAction::Grant),
            "Revoke" => Some(ConsentAction::Revoke),
            _ => None,
        }
    }

    pub fn status(self) -> ConsentStatus {
        match self {
            ConsentAction::Grant => ConsentStatus::Granted,
            ConsentAction::Revoke => ConsentStatus::Revoked,
        }
    }

    /// Ledger entry type recorded for this transition.
    pub fn ledger_type(self) -> &'static str {
        match self {
            ConsentAction::Grant => "Consent Grant",
            ConsentAction::Revoke => "Consent Revoke",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            ConsentAction::Grant => "granted",
            ConsentAction::Revoke => "revoked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub patient: String,
    pub doctor: String,
    #[serde(rename = "doctorName")]
    pub doctor_name: String,
    pub hospital: String,
    pub status: ConsentStatus,
}

#[derive(Clone)]
pub struct ConsentStore {
    db: Database,
    directory: Directory,
}

impl ConsentStore {
    pub fn new(db: Database, directory: Directory) -> Self {
        ConsentStore { db, directory }
    }

    /// Apply a grant/revoke for the pair. Upsert keyed on
    /// (patient, doctor) so concurrent calls converge on the last value
    /// without duplicate rows. Display fields are refreshed from the
    /// doctor's profile at write time.
    pub async fn apply(
        &self,
        patient: &str,
        doctor: &DoctorProfile,
        action: ConsentAction,
    ) -> Result<ConsentRecord, AppError> {
        let status = action.status();
        sqlx::query(
            "INSERT INTO consents (patient, doctor, doctor_name, hospital, status, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (patient, doctor) DO UPDATE SET \
                 status = excluded.status, \
                 doctor_name = excluded.doctor_name, \
                 hospital = excluded.hospital, \
                 updated_at = excluded.updated_at",
        )
        .bind(patient)
        .bind(&doctor.username)
        .bind(&doctor.display_name)
        .bind(&doctor.hospital)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(ConsentRecord {
            patient: patient.to_string(),
            doctor: doctor.username.clone(),
            doctor_name: doctor.display_name.clone(),
            hospital: doctor.hospital.clone(),
            status,
        })
    }

    /// A patient's consent records. On first reference, one Revoked row
    /// is created for every known doctor so the patient sees the full
    /// set of relationships.
    pub async fn for_patient(&self, patient: &str) -> Result<Vec<ConsentRecord>, AppError> {
        let existing = self.fetch_for_patient(patient).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        for doctor in self.directory.list_doctors().await? {
            sqlx::query(
                "INSERT OR IGNORE INTO consents \
                 (patient, doctor, doctor_name, hospital, status, updated_at) \
                 VALUES (?, ?, ?, ?, 'Revoked', ?)",
            )
            .bind(patient)
            .bind(&doctor.username)
            .bind(&doctor.display_name)
            .bind(&doctor.hospital)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.pool())
            .await?;
        }

        self.fetch_for_patient(patient).await
    }

    pub async fn for_doctor(&self, doctor: &str) -> Result<Vec<ConsentRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT patient, doctor, doctor_name, hospital, status \
             FROM consents WHERE doctor = ? ORDER BY patient",
        )
        .bind(doctor)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn all(&self) -> Result<Vec<ConsentRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT patient, doctor, doctor_name, hospital, status \
             FROM consents ORDER BY patient, doctor",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Is this doctor allowed to touch this patient's history? True on a
    /// direct Granted record for the pair, or a Granted record whose
    /// hospital matches the doctor's affiliated hospital. Unknown
    /// identities are never granted.
    pub async fn check_consent(&self, patient: &str, doctor: &str) -> Result<bool, AppError> {
        if self.directory.find_user(patient).await?.is_none()
            || self.directory.find_user(doctor).await?.is_none()
        {
            return Ok(false);
        }

        let direct: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM consents WHERE patient = ? AND doctor = ? AND status = 'Granted'",
        )
        .bind(patient)
        .bind(doctor)
        .fetch_optional(self.db.pool())
        .await?;
        if direct.is_some() {
            return Ok(true);
        }

        let Some(profile) = self.directory.find_doctor(doctor).await? else {
            return Ok(false);
        };

        let hospital_wide: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM consents WHERE patient = ? AND hospital = ? AND status = 'Granted'",
        )
        .bind(patient)
        .bind(&profile.hospital)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(hospital_wide.is_some())
    }

    async fn fetch_for_patient(&self, patient: &str) -> Result<Vec<ConsentRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT patient, doctor, doctor_name, hospital, status \
             FROM consents WHERE patient = ? ORDER BY doctor",
        )
        .bind(patient)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<ConsentRecord, AppError> {
    let status: String = row.get("status");
    let status = ConsentStatus::parse(&status)
        .ok_or_else(|| AppError::Database(format!("unknown consent status '{}'", status)))?;

    Ok(ConsentRecord {
        patient: row.get("patient"),
        doctor: row.get("doctor"),
        doctor_name: row.get("doctor_name"),
        hospital: row.get("hospital"),
        status,
    })
}
