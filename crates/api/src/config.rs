//! Server configuration loaded from the environment.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// OCR service endpoint. The service is an opaque collaborator; only
    /// its URL and optional key are ours to configure.
    pub ocr_endpoint: String,
    pub ocr_api_key: Option<String>,
    /// Optional zero-shot classification endpoint. Absent means the
    /// keyword classifier runs alone.
    pub ai_classifier_endpoint: Option<String>,
    pub ai_classifier_api_key: Option<String>,
    /// Shared secret gating the admin remediation endpoint.
    pub admin_token: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            ocr_endpoint: std::env::var("OCR_ENDPOINT").context("OCR_ENDPOINT not set")?,
            ocr_api_key: optional("OCR_API_KEY"),
            ai_classifier_endpoint: optional("AI_CLASSIFIER_ENDPOINT"),
            ai_classifier_api_key: optional("AI_CLASSIFIER_API_KEY"),
            admin_token: optional("ADMIN_TOKEN"),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
