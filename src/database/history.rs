// ABOUTME: Login-event recording for successful token issuances
// ABOUTME: The per-application statistics built over this table live outside the core
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::Database;
use crate::errors::AppResult;
use chrono::Utc;

impl Database {
    /// Record that `username` obtained tokens for `app_id`
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn record_login(&self, username: &str, app_id: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO login_history (username, app_id, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(app_id)
            .bind(Utc::now())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
