pub mod access;
pub mod auth;
pub mod config;
pub mod consent;
pub mod database;
pub mod directory;
pub mod error;
pub mod history;
pub mod ledger;
pub mod routes;

pub use error::AppError;
