//! Patient history storage. Records are insert-only; for self-reports
//! the doctor identity equals the patient identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::database::Database;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientHistoryRecord {
    pub patient: String,
    pub doctor: String,
    pub hospital: String,
    pub details: String,
    pub date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HistoryStore {
    db: Database,
}

impl HistoryStore {
    pub fn new(db: Database) -> Self {
        HistoryStore { db }
    }

    pub async fn create(
        &self,
        patient: &str,
        doctor: &str,
        hospital: &str,
        details: &str,
    ) -> Result<PatientHistoryRecord, AppError> {
        let date = Utc::now();
        sqlx::query(
            "INSERT INTO patient_history (patient, doctor, hospital, details, date) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(patient)
        .bind(doctor)
        .bind(hospital)
        .bind(details)
        .bind(date.to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(PatientHistoryRecord {
            patient: patient.to_string(),
            doctor: doctor.to_string(),
            hospital: hospital.to_string(),
            details: details.to_string(),
            date,
        })
    }

    pub async fn for_patient(&self, patient: &str) -> Result<Vec<PatientHistoryRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT patient, doctor, hospital, details, date \
             FROM patient_history WHERE patient = ? ORDER BY date DESC, id DESC",
        )
        .bind(patient)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn all(&self) -> Result<Vec<PatientHistoryRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT patient, doctor, hospital, details, date \
             FROM patient_history ORDER BY date DESC, id DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PatientHistoryRecord, AppError> {
    let date: String = row.get("date");
    let date = DateTime::parse_from_rfc3339(&date)
        .map_err(|e| AppError::Database(format!("bad date in history row: {}", e)))?
        .with_timezone(&Utc);

    Ok(PatientHistoryRecord {
        patient: row.get("patient"),
        doctor: row.get("doctor"),
        hospital: row.get("hospital"),
        details: row.get("details"),
        date,
    })
}
