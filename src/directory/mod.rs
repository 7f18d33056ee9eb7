//! Identity directory.
//!
//! Read-side collaborator for the registration and profile screens that
//! live outside this service. Everything keys on the stable username;
//! display names and hospital names are carried as strings so audit
//! output stays readable independent of later renames.

use sqlx::Row;

use crate::access::Role;
use crate::database::Database;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct DoctorProfile {
    pub username: String,
    pub display_name: String,
    pub specialty: String,
    pub hospital: String,
}

#[derive(Debug, Clone)]
pub struct PatientProfile {
    pub username: String,
    pub display_name: String,
    pub hospital: String,
}

#[derive(Clone)]
pub struct Directory {
    db: Database,
}

impl Directory {
    pub fn new(db: Database) -> Self {
        Directory { db }
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query("SELECT username, role FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => {
                let role: String = row.get("role");
                let role = Role::parse(&role).ok_or_else(|| {
                    AppError::Database(format!("unknown role '{}' for user {}", role, username))
                })?;
                Ok(Some(UserProfile {
                    username: row.get("username"),
                    role,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn find_doctor(&self, username: &str) -> Result<Option<DoctorProfile>, AppError> {
        let row = sqlx::query(
            "SELECT username, display_name, specialty, hospital FROM doctors WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| DoctorProfile {
            username: row.get("username"),
            display_name: row.get("display_name"),
            specialty: row.get("specialty"),
            hospital: row.get("hospital"),
        }))
    }

    pub async fn find_patient(&self, username: &str) -> Result<Option<PatientProfile>, AppError> {
        let row = sqlx::query(
            "SELECT username, display_name, hospital FROM patients WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| PatientProfile {
            username: row.get("username"),
            display_name: row.get("display_name"),
            hospital: row.get("hospital"),
        }))
    }

    pub async fn list_doctors(&self) -> Result<Vec<DoctorProfile>, AppError> {
        let rows = sqlx::query(
            "SELECT username, display_name, specialty, hospital FROM doctors ORDER BY username",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DoctorProfile {
                username: row.get("username"),
                display_name: row.get("display_name"),
                specialty: row.get("specialty"),
                hospital: row.get("hospital"),
            })
            .collect())
    }

    // Write surface used by seeding and tests; the real registration
    // flows are out of scope for this service.

    pub async fn add_user(&self, username: &str, role: Role) -> Result<(), AppError> {
        sqlx::query("INSERT OR REPLACE INTO users (username, role) VALUES (?, ?)")
            .bind(username)
            .bind(role.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn add_doctor(
        &self,
        username: &str,
        display_name: &str,
        specialty: &str,
        hospital: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT OR REPLACE INTO doctors (username, display_name, specialty, hospital) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(display_name)
        .bind(specialty)
        .bind(hospital)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn add_patient(
        &self,
        username: &str,
        display_name: &str,
        hospital: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT OR REPLACE INTO patients (username, display_name, hospital) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(display_name)
        .bind(hospital)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory() -> Directory {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        Directory::new(db)
    }

    #[tokio::test]
    async fn test_user_lookup() {
        let dir = directory().await;
        dir.add_user("sitasharma", Role::Patient).await.unwrap();

        let user = dir.find_user("sitasharma").await.unwrap().unwrap();
        assert_eq!(user.username, "sitasharma");
        assert_eq!(user.role, Role::Patient);

        assert!(dir.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_doctor_lookup_and_listing() {
        let dir = directory().await;
        dir.add_doctor("anilthapa", "Dr. Anil Thapa", "Cardiology", "Bir Hospital")
            .await
            .unwrap();
        dir.add_doctor("sunitalama", "Dr. Sunita Lama", "Pediatrics", "Dhulikhel Hospital")
            .await
            .unwrap();

        let doc = dir.find_doctor("anilthapa").await.unwrap().unwrap();
        assert_eq!(doc.display_name, "Dr. Anil Thapa");
        assert_eq!(doc.hospital, "Bir Hospital");

        let all = dir.list_doctors().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
