// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Loads server, database, and URL configuration from environment variables
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Server configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Base URL of the consent UI frontend (no trailing slash)
    pub frontend_url: String,
    /// Base URL of this server, used as the token issuer (no trailing slash)
    pub backend_url: String,
}

impl ServerConfig {
    /// Load configuration from environment variables, with `.env` support
    ///
    /// Missing variables fall back to development defaults; the fallbacks are
    /// logged so a misconfigured deployment is visible at startup.
    #[must_use]
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {e}");
        }

        let http_port = env::var("HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8081);

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            warn!("DATABASE_URL not set, using sqlite:passgate.db");
            "sqlite:passgate.db".into()
        });

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".into());

        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| format!("http://localhost:{http_port}"));

        Self {
            http_port,
            database_url,
            frontend_url: strip_trailing_slash(&frontend_url),
            backend_url: strip_trailing_slash(&backend_url),
        }
    }

    /// Logging configuration for this deployment
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::from_env()
    }
}

/// Issuer and frontend URLs are compared and concatenated; keep them canonical
fn strip_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_stripped() {
        assert_eq!(
            strip_trailing_slash("https://id.example.com/"),
            "https://id.example.com"
        );
        assert_eq!(
            strip_trailing_slash("https://id.example.com"),
            "https://id.example.com"
        );
    }
}
