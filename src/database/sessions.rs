// ABOUTME: Authorization session store for both OAuth flows with lazy expiry
// ABOUTME: Single-use transitions are conditional UPDATEs so concurrent exchanges cannot both win
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::Database;
use crate::constants::limits;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{AuthorizationSession, FlowType, SessionStatus};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

fn map_session(row: &SqliteRow) -> AppResult<AuthorizationSession> {
    let flow_type: String = row.try_get("flow_type")?;
    let status: String = row.try_get("status")?;

    Ok(AuthorizationSession {
        session_id: row.try_get("session_id")?,
        client_id: row.try_get("client_id")?,
        username: row.try_get("username")?,
        flow_type: FlowType::parse(&flow_type).ok_or_else(|| {
            AppError::new(ErrorCode::DatabaseError, format!("Bad flow_type: {flow_type}"))
        })?,
        status: SessionStatus::parse(&status).ok_or_else(|| {
            AppError::new(ErrorCode::DatabaseError, format!("Bad status: {status}"))
        })?,
        device_code: row.try_get("device_code")?,
        user_code: row.try_get("user_code")?,
        last_poll: row.try_get("last_poll")?,
        redirect_uri: row.try_get("redirect_uri")?,
        code_challenge: row.try_get("code_challenge")?,
        code_challenge_method: row.try_get("code_challenge_method")?,
        state: row.try_get("state")?,
        auth_code: row.try_get("auth_code")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SESSION_COLUMNS: &str = "session_id, client_id, username, flow_type, device_code, \
     user_code, last_poll, code_challenge, code_challenge_method, redirect_uri, auth_code, \
     state, status, created_at, expires_at, updated_at";

impl Database {
    /// Create a pending authorization-code session, expiring in 15 minutes
    ///
    /// # Errors
    /// Returns an error on I/O failure or id collision
    pub async fn create_auth_code_session(
        &self,
        client_id: &str,
        session_id: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
        code_challenge_method: Option<&str>,
        state: Option<&str>,
    ) -> AppResult<()> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(limits::SESSION_TTL_MINUTES);

        sqlx::query(
            "INSERT INTO oauth_sessions
                 (session_id, client_id, flow_type, redirect_uri, code_challenge,
                  code_challenge_method, state, status, created_at, expires_at, updated_at)
             VALUES (?, ?, 'authorization_code', ?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(session_id)
        .bind(client_id)
        .bind(redirect_uri)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .bind(state)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Create a pending device-flow session, expiring in 15 minutes
    ///
    /// The user code is normalized to upper-case on insert; `last_poll`
    /// starts at creation so an immediate poll is already rate limited.
    ///
    /// # Errors
    /// Returns an error on I/O failure or code collision
    pub async fn create_device_flow_session(
        &self,
        client_id: &str,
        session_id: &str,
        device_code: &str,
        user_code: &str,
    ) -> AppResult<()> {
        let now = Utc::now();
        let expires_at = now + Duration::minutes(limits::SESSION_TTL_MINUTES);

        sqlx::query(
            "INSERT INTO oauth_sessions
                 (session_id, client_id, flow_type, device_code, user_code, last_poll,
                  status, created_at, expires_at, updated_at)
             VALUES (?, ?, 'device_code', ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(session_id)
        .bind(client_id)
        .bind(device_code)
        .bind(user_code.to_uppercase())
        .bind(now)
        .bind(now)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Look up a session by primary key
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_by_session_id(
        &self,
        session_id: &str,
    ) -> AppResult<Option<AuthorizationSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM oauth_sessions WHERE session_id = ?"
        ))
        .bind(session_id)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let session = map_session(&row)?;
                Ok(Some(self.lazily_expire(session).await?))
            }
            None => Ok(None),
        }
    }

    /// Look up a device-flow session by its device code
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_by_device_code(
        &self,
        device_code: &str,
    ) -> AppResult<Option<AuthorizationSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM oauth_sessions WHERE device_code = ?"
        ))
        .bind(device_code)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let session = map_session(&row)?;
                Ok(Some(self.lazily_expire(session).await?))
            }
            None => Ok(None),
        }
    }

    /// Look up a pending device-flow session by user code, case-insensitively
    ///
    /// Expired sessions are marked and reported as absent; the user cannot
    /// act on them anymore.
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_by_user_code(
        &self,
        user_code: &str,
    ) -> AppResult<Option<AuthorizationSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM oauth_sessions
             WHERE user_code = ? AND status = 'pending'"
        ))
        .bind(user_code.trim().to_uppercase())
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let session = map_session(&row)?;
                let session = self.lazily_expire(session).await?;
                Ok((session.status == SessionStatus::Pending).then_some(session))
            }
            None => Ok(None),
        }
    }

    /// Look up an authorization-code session by its single-use code
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn get_by_auth_code(
        &self,
        auth_code: &str,
    ) -> AppResult<Option<AuthorizationSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM oauth_sessions WHERE auth_code = ?"
        ))
        .bind(auth_code)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => {
                let session = map_session(&row)?;
                Ok(Some(self.lazily_expire(session).await?))
            }
            None => Ok(None),
        }
    }

    /// Advance `last_poll` if it still matches the value the caller observed
    ///
    /// Compare-and-set keeps the rate-limit check and update atomic: when two
    /// polls race, only one advances the timestamp and the other sees `false`.
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn update_poll(
        &self,
        session_id: &str,
        observed_last_poll: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE oauth_sessions SET last_poll = ?, updated_at = ?
             WHERE session_id = ? AND last_poll IS ?",
        )
        .bind(now)
        .bind(now)
        .bind(session_id)
        .bind(observed_last_poll)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Transition a session to `new_status`, optionally attaching the user
    ///
    /// Expiry is applied first; an illegal transition (any exit from a
    /// terminal status) is rejected.
    ///
    /// # Errors
    /// Returns `ResourceNotFound` for unknown sessions and `InvalidInput`
    /// for illegal transitions
    pub async fn update_status(
        &self,
        session_id: &str,
        new_status: SessionStatus,
        username: Option<&str>,
    ) -> AppResult<()> {
        let session = self
            .get_by_session_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Session not found"))?;

        if !session.status.can_transition_to(new_status) {
            return Err(AppError::invalid_input(format!(
                "Illegal session transition: {} -> {}",
                session.status.as_str(),
                new_status.as_str()
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE oauth_sessions
             SET status = ?, username = COALESCE(?, username), updated_at = ?
             WHERE session_id = ? AND status = ?",
        )
        .bind(new_status.as_str())
        .bind(username)
        .bind(now)
        .bind(session_id)
        .bind(session.status.as_str())
        .execute(self.pool())
        .await?;

        // A concurrent writer moved the session first; the observed
        // transition is no longer valid.
        if result.rows_affected() == 0 {
            return Err(AppError::invalid_input("Session status changed concurrently"));
        }
        Ok(())
    }

    /// Attach the authorization code at consent-approve: pending -> authorized
    ///
    /// # Errors
    /// Returns `InvalidInput` if the session is not pending anymore
    pub async fn attach_auth_code(
        &self,
        session_id: &str,
        auth_code: &str,
        username: &str,
    ) -> AppResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE oauth_sessions
             SET status = 'authorized', auth_code = ?, username = ?, updated_at = ?
             WHERE session_id = ? AND status = 'pending'",
        )
        .bind(auth_code)
        .bind(username)
        .bind(now)
        .bind(session_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::invalid_input("Session is not pending"));
        }
        Ok(())
    }

    /// Single-use gate: authorized -> consumed, exactly once
    ///
    /// Returns `true` for the caller that won the transition. A concurrent
    /// exchange of the same code, or a session already expired by the lazy
    /// check, observes `false`.
    ///
    /// # Errors
    /// Returns an error on I/O failure
    pub async fn consume_session(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE oauth_sessions SET status = 'consumed', updated_at = ?
             WHERE session_id = ? AND status = 'authorized'",
        )
        .bind(Utc::now())
        .bind(session_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mark a session expired if its deadline passed while still live
    async fn lazily_expire(
        &self,
        mut session: AuthorizationSession,
    ) -> AppResult<AuthorizationSession> {
        let now = Utc::now();
        let live = matches!(
            session.status,
            SessionStatus::Pending | SessionStatus::Authorized
        );

        if live && session.is_expired(now) {
            sqlx::query(
                "UPDATE oauth_sessions SET status = 'expired', updated_at = ?
                 WHERE session_id = ? AND status IN ('pending', 'authorized')",
            )
            .bind(now)
            .bind(&session.session_id)
            .execute(self.pool())
            .await?;

            session.status = SessionStatus::Expired;
            session.updated_at = now;
        }

        Ok(session)
    }

    /// Force a session's deadline into the past; test support for expiry paths
    #[doc(hidden)]
    pub async fn force_expire_at(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE oauth_sessions SET expires_at = ? WHERE session_id = ?")
            .bind(expires_at)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Rewind a device session's `last_poll`; test support for the rate limit
    #[doc(hidden)]
    pub async fn force_last_poll(
        &self,
        session_id: &str,
        last_poll: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE oauth_sessions SET last_poll = ? WHERE session_id = ?")
            .bind(last_poll)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
