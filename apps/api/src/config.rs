use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails with context if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the recruiting pipeline gateway (candidates, rounds, statuses).
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    /// Base URL of the AI evaluation service.
    pub evaluation_base_url: String,
    pub evaluation_api_key: String,
    /// Default candidate page size for round views.
    pub page_size: u32,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            gateway_base_url: require_env("GATEWAY_BASE_URL")?,
            gateway_api_key: require_env("GATEWAY_API_KEY")?,
            evaluation_base_url: require_env("EVALUATION_BASE_URL")?,
            evaluation_api_key: require_env("EVALUATION_API_KEY")?,
            page_size: std::env::var("PAGE_SIZE")
                .unwrap_or_else(|_| "25".to_string())
                .parse::<u32>()
                .context("PAGE_SIZE must be a positive integer")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
