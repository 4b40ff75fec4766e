// ABOUTME: Credential store: applications, memberships, trusted URIs, client secrets, API keys
// ABOUTME: Client secrets are bcrypt hashed, API keys SHA-256 hashed; raw values are returned once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::Database;
use crate::api_keys::ApiKeyManager;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{ApiKey, AppRole, Application, ClientSecret, TrustedUri};
use crate::utils::ids;
use chrono::{DateTime, Utc};
use sqlx::Row;

impl Database {
    /// Create an application and assign `owner` as its root admin, atomically
    ///
    /// # Errors
    /// Returns an error on constraint violations (duplicate name) or I/O failure
    pub async fn create_app(
        &self,
        name: &str,
        description: Option<&str>,
        owner: &str,
    ) -> AppResult<String> {
        let app_id = ids::generate_id();
        let now = Utc::now();

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO applications (id, name, description, device_code_enabled, created_at)
             VALUES (?, ?, ?, FALSE, ?)",
        )
        .bind(&app_id)
        .bind(name)
        .bind(description)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO app_members (app_id, username, role, created_at) VALUES (?, ?, 'root', ?)",
        )
        .bind(&app_id)
        .bind(owner)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(app_id)
    }

    /// Fetch an application by id
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_app(&self, app_id: &str) -> AppResult<Option<Application>> {
        let row = sqlx::query(
            "SELECT id, name, description, logo_url, suspend_until, device_code_enabled, created_at
             FROM applications WHERE id = ?",
        )
        .bind(app_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| {
            Ok(Application {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                logo_url: row.try_get("logo_url")?,
                suspend_until: row.try_get("suspend_until")?,
                device_code_enabled: row.try_get("device_code_enabled")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    /// Update display name, description, and logo URL
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the application does not exist
    pub async fn update_app_info(
        &self,
        app_id: &str,
        name: &str,
        description: Option<&str>,
        logo_url: Option<&str>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE applications SET name = ?, description = ?, logo_url = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(logo_url)
        .bind(app_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Application not found"));
        }
        Ok(())
    }

    /// Set or clear the suspension deadline
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the application does not exist
    pub async fn set_suspension(
        &self,
        app_id: &str,
        until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE applications SET suspend_until = ? WHERE id = ?")
            .bind(until)
            .bind(app_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Application not found"));
        }
        Ok(())
    }

    /// Toggle the device authorization flow for an application
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if the application does not exist
    pub async fn set_device_code_enabled(&self, app_id: &str, enabled: bool) -> AppResult<()> {
        let result = sqlx::query("UPDATE applications SET device_code_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(app_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Application not found"));
        }
        Ok(())
    }

    /// Delete an application; sessions and credentials cascade
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn delete_app(&self, app_id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(app_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Membership role of `username` within the application, if any
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_app_role(&self, app_id: &str, username: &str) -> AppResult<Option<AppRole>> {
        let row = sqlx::query("SELECT role FROM app_members WHERE app_id = ? AND username = ?")
            .bind(app_id)
            .bind(username)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.and_then(|row| {
            let role: String = row.try_get("role").ok()?;
            match role.as_str() {
                "admin" => Some(AppRole::Admin),
                "root" => Some(AppRole::Root),
                _ => None,
            }
        }))
    }

    /// List the registered redirect URIs for an application
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn list_trusted_uris(&self, app_id: &str) -> AppResult<Vec<TrustedUri>> {
        let rows = sqlx::query(
            "SELECT id, app_id, name, uri, created_at FROM trusted_uris
             WHERE app_id = ? ORDER BY id",
        )
        .bind(app_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TrustedUri {
                    id: row.try_get("id")?,
                    app_id: row.try_get("app_id")?,
                    name: row.try_get("name")?,
                    uri: row.try_get("uri")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Register a redirect URI for an application
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn add_trusted_uri(
        &self,
        app_id: &str,
        name: Option<&str>,
        uri: &str,
    ) -> AppResult<i64> {
        let result =
            sqlx::query("INSERT INTO trusted_uris (app_id, name, uri, created_at) VALUES (?, ?, ?, ?)")
                .bind(app_id)
                .bind(name)
                .bind(uri.trim())
                .bind(Utc::now())
                .execute(self.pool())
                .await?;

        Ok(result.last_insert_rowid())
    }

    /// Remove a trusted URI; the `app_id` guard prevents cross-app deletion
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if no matching row exists
    pub async fn delete_trusted_uri(&self, id: i64, app_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM trusted_uris WHERE id = ? AND app_id = ?")
            .bind(id)
            .bind(app_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Trusted URI not found"));
        }
        Ok(())
    }

    /// Whether `uri` is registered for the application, byte-exact after trim
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn is_trusted_uri(&self, app_id: &str, uri: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM trusted_uris WHERE app_id = ? AND uri = ?")
            .bind(app_id)
            .bind(uri.trim())
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }

    /// Create a client secret; the raw value is returned exactly once
    ///
    /// # Errors
    /// Returns an error on hash or I/O failure
    pub async fn create_client_secret(
        &self,
        app_id: &str,
        name: Option<&str>,
    ) -> AppResult<(i64, String)> {
        let raw = ids::generate_secret();

        let to_hash = raw.clone();
        let secret_hash = tokio::task::spawn_blocking(move || {
            bcrypt::hash(&to_hash, bcrypt::DEFAULT_COST)
        })
        .await
        .map_err(|e| AppError::internal(format!("Hash task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("Failed to hash client secret: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO client_secrets (app_id, name, secret_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(app_id)
        .bind(name)
        .bind(secret_hash)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok((result.last_insert_rowid(), raw))
    }

    /// List client secret metadata (never the hashes)
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn list_client_secrets(&self, app_id: &str) -> AppResult<Vec<ClientSecret>> {
        let rows = sqlx::query(
            "SELECT id, app_id, name, created_at FROM client_secrets WHERE app_id = ? ORDER BY id",
        )
        .bind(app_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ClientSecret {
                    id: row.try_get("id")?,
                    app_id: row.try_get("app_id")?,
                    name: row.try_get("name")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Verify a presented secret against every active secret for the app
    ///
    /// bcrypt comparison runs on the blocking pool; true on any match.
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn validate_client_secret(&self, app_id: &str, raw: &str) -> AppResult<bool> {
        let rows = sqlx::query("SELECT secret_hash FROM client_secrets WHERE app_id = ?")
            .bind(app_id)
            .fetch_all(self.pool())
            .await?;

        let hashes: Vec<String> = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("secret_hash"))
            .collect::<Result<_, _>>()?;

        if hashes.is_empty() {
            return Ok(false);
        }

        let candidate = raw.to_owned();
        let matched = tokio::task::spawn_blocking(move || {
            hashes
                .iter()
                .any(|hash| bcrypt::verify(&candidate, hash).unwrap_or(false))
        })
        .await
        .map_err(|e| AppError::internal(format!("Verify task failed: {e}")))?;

        Ok(matched)
    }

    /// Remove a client secret
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if no matching row exists
    pub async fn delete_client_secret(&self, id: i64, app_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM client_secrets WHERE id = ? AND app_id = ?")
            .bind(id)
            .bind(app_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Client secret not found"));
        }
        Ok(())
    }

    /// Create an API key; the raw value is returned exactly once
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn create_api_key(
        &self,
        app_id: &str,
        name: Option<&str>,
    ) -> AppResult<(i64, String)> {
        let (raw, key_hash) = ApiKeyManager::new().generate_key();

        let result = sqlx::query(
            "INSERT INTO api_keys (app_id, name, key_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(app_id)
        .bind(name)
        .bind(key_hash)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok((result.last_insert_rowid(), raw))
    }

    /// List API key metadata (never the hashes)
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn list_api_keys(&self, app_id: &str) -> AppResult<Vec<ApiKey>> {
        let rows = sqlx::query(
            "SELECT id, app_id, name, created_at FROM api_keys WHERE app_id = ? ORDER BY id",
        )
        .bind(app_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ApiKey {
                    id: row.try_get("id")?,
                    app_id: row.try_get("app_id")?,
                    name: row.try_get("name")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Resolve an application from an API key digest
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn lookup_app_by_api_key_hash(&self, sha256_hex: &str) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT app_id FROM api_keys WHERE key_hash = ?")
            .bind(sha256_hex)
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| {
            row.try_get("app_id")
                .map_err(|e| AppError::new(ErrorCode::DatabaseError, e.to_string()))
        })
        .transpose()
    }

    /// Remove an API key
    ///
    /// # Errors
    /// Returns `ResourceNotFound` if no matching row exists
    pub async fn delete_api_key(&self, id: i64, app_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ? AND app_id = ?")
            .bind(id)
            .bind(app_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("API key not found"));
        }
        Ok(())
    }
}
