// ABOUTME: SQLite database connection management and schema migration
// ABOUTME: The Database handle is cloned into every request handler; SQLite is authoritative
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Persistence Layer
//!
//! One [`Database`] wraps an `sqlx` SQLite pool. The credential store lives
//! in [`apps`], the authorization-session store in [`sessions`], and login
//! events in [`history`]. There are no in-memory caches; every read goes to
//! the database.

/// Credential store: applications, trusted URIs, secrets, API keys
pub mod apps;
/// Login-event recording
pub mod history;
/// Authorization session store
pub mod sessions;

use crate::errors::AppResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// Shared database handle
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database at `url` and run migrations
    ///
    /// In-memory databases are pinned to a single connection so every query
    /// sees the same schema.
    ///
    /// # Errors
    /// Returns an error if the connection or a migration statement fails
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.migrate().await?;

        info!("Database connected and migrated");
        Ok(database)
    }

    /// The underlying pool, for store modules in this crate
    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist
    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                logo_url TEXT,
                suspend_until TIMESTAMP,
                device_code_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS app_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                username TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('admin', 'root')),
                created_at TIMESTAMP NOT NULL,
                UNIQUE (app_id, username)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trusted_uris (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                name TEXT,
                uri TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS client_secrets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                name TEXT,
                secret_hash TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                name TEXT,
                key_hash TEXT NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS oauth_sessions (
                session_id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                username TEXT,
                flow_type TEXT NOT NULL
                    CHECK (flow_type IN ('authorization_code', 'device_code')),
                device_code TEXT UNIQUE,
                user_code TEXT,
                last_poll TIMESTAMP,
                code_challenge TEXT,
                code_challenge_method TEXT,
                redirect_uri TEXT,
                auth_code TEXT UNIQUE,
                state TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('pending', 'authorized', 'consumed', 'denied', 'expired')),
                created_at TIMESTAMP NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_oauth_sessions_user_code
             ON oauth_sessions (user_code)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS login_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                app_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
