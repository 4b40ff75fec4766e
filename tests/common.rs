// ABOUTME: Shared fixtures for integration tests
// ABOUTME: In-memory database, seeded applications, and user-session bearer tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(dead_code)] // each integration test crate uses a subset of these helpers

use anyhow::Result;
use passgate::auth::AuthManager;
use passgate::config::ServerConfig;
use passgate::crypto::shared_signer;
use passgate::database::Database;
use std::sync::Arc;

/// Issuer used by every test server
pub const TEST_ISSUER: &str = "http://localhost:8081";
/// Consent UI base used by every test server
pub const TEST_FRONTEND: &str = "http://localhost:5173";
/// Trusted redirect URI seeded for test applications
pub const TEST_REDIRECT_URI: &str = "https://client.example/cb";

/// Fresh in-memory database with migrations applied
pub async fn create_test_database() -> Result<Database> {
    Ok(Database::connect("sqlite::memory:").await?)
}

/// Auth manager bound to the test issuer
pub fn create_auth_manager() -> Arc<AuthManager> {
    Arc::new(AuthManager::new(TEST_ISSUER))
}

/// Server configuration matching the test issuer and frontend
pub fn create_test_config() -> Arc<ServerConfig> {
    Arc::new(ServerConfig {
        http_port: 8081,
        database_url: "sqlite::memory:".into(),
        frontend_url: TEST_FRONTEND.into(),
        backend_url: TEST_ISSUER.into(),
    })
}

/// Create an application owned by `owner` with the standard trusted URI
pub async fn seed_app(database: &Database, name: &str, owner: &str) -> Result<String> {
    let app_id = database.create_app(name, Some("test app"), owner).await?;
    database
        .add_trusted_uri(&app_id, Some("callback"), TEST_REDIRECT_URI)
        .await?;
    Ok(app_id)
}

/// Mint a user-session bearer token (access token for the `system` app)
pub fn user_session_token(auth_manager: &AuthManager, username: &str) -> Result<String> {
    let jwks = shared_signer()?;
    auth_manager.sign_default_access_token(&jwks, "system", username)
}

/// `Authorization` header value for a token
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Percent-encode a query value
pub fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
