use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://carechain.db".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let jwt_secret =
            env::var("JWT_SECRET").unwrap_or_else(|_| "insecure-dev-secret".to_string());

        Ok(AppConfig {
            database_url,
            server_host,
            server_port,
            jwt_secret,
        })
    }
}
