//! HTTP surface: ledger reads, consent mutations, gated history.

pub mod consents;
pub mod history;
pub mod ledger;

use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::consent::ConsentStore;
use crate::database::Database;
use crate::directory::Directory;
use crate::history::HistoryStore;
use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub directory: Directory,
    pub ledger: Ledger,
    pub consents: ConsentStore,
    pub history: HistoryStore,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> Self {
        let directory = Directory::new(db.clone());
        AppState {
            config,
            directory: directory.clone(),
            ledger: Ledger::new(db.clone()),
            consents: ConsentStore::new(db.clone(), directory),
            history: HistoryStore::new(db),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ledger", get(ledger::list_ledger))
        .route("/ledger/_internal/verify", get(ledger::verify_ledger))
        .route("/ledger/:entity", get(ledger::ledger_by_entity))
        .route(
            "/consents",
            get(consents::consents_by_patient).post(consents::upsert_consent),
        )
        .route("/consents/doctor", get(consents::consents_by_doctor))
        .route("/consents/all", get(consents::all_consents))
        .route(
            "/patient-history",
            get(history::all_histories).post(history::create_history),
        )
        .route("/patient-history/:patient_id", get(history::patient_history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "carechain",
        "timestamp": chrono::Utc::now()
    }))
}
