// ABOUTME: OAuth 2.0 authorization server: code flow, device flow, consent, and token issuance
// ABOUTME: Session state transitions go through the store's conditional updates for single-use safety
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::models::{
    AuthorizeRequest, ConsentMessageResponse, ConsentRedirectResponse, ConsentRequest,
    DeviceAuthorizationResponse, OAuth2Error, SessionDetailsResponse, TokenRequest, TokenResponse,
};
use super::policy;
use crate::auth::AuthManager;
use crate::constants::{limits, oauth};
use crate::crypto::{shared_signer, JwksManager};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{AuthorizationSession, FlowType, SessionStatus};
use crate::utils::ids;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of an authorization request on the browser endpoint
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// 302 to the given location: the consent UI, or the client with error params
    Redirect(String),
    /// 400 with an OAuth error body; the redirect URI could not be trusted
    Reject(OAuth2Error),
}

/// Token endpoint failure: protocol errors are 400 JSON, the rest is 500
#[derive(Debug)]
pub enum TokenError {
    /// RFC 6749/8628 error, returned as `{"error": …}` with status 400
    OAuth(OAuth2Error),
    /// Internal fault, returned as a generic 500
    Internal(AppError),
}

impl From<OAuth2Error> for TokenError {
    fn from(err: OAuth2Error) -> Self {
        Self::OAuth(err)
    }
}

impl From<AppError> for TokenError {
    fn from(err: AppError) -> Self {
        Self::Internal(err)
    }
}

/// OAuth 2.0 authorization server over the credential and session stores
pub struct AuthorizationServer {
    database: Database,
    auth_manager: Arc<AuthManager>,
    frontend_url: String,
}

impl AuthorizationServer {
    /// Create a server instance
    #[must_use]
    pub fn new(database: Database, auth_manager: Arc<AuthManager>, frontend_url: &str) -> Self {
        Self {
            database,
            auth_manager,
            frontend_url: frontend_url.trim_end_matches('/').to_owned(),
        }
    }

    /// URL of the consent UI for a session
    fn consent_page_url(&self, session_id: &str) -> String {
        format!("{}/auth?session_id={session_id}", self.frontend_url)
    }

    /// Handle the authorization request (GET /oauth2/authorize)
    ///
    /// Redirect-style errors go back to the client only after the redirect
    /// URI itself parsed; an untrusted URI is answered with 400 and never
    /// echoed into a Location header.
    ///
    /// # Errors
    /// Returns an error on store I/O failure
    pub async fn authorize(&self, request: AuthorizeRequest) -> AppResult<AuthorizeOutcome> {
        if request.redirect_uri.trim().is_empty() {
            return Ok(AuthorizeOutcome::Reject(OAuth2Error::invalid_request(
                "Missing redirect_uri",
            )));
        }
        match Url::parse(&request.redirect_uri) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Ok(AuthorizeOutcome::Reject(OAuth2Error::invalid_request(
                    "redirect_uri must be an absolute http(s) URL",
                )));
            }
        }

        let state = request.state.as_deref();

        if request.response_type != oauth::RESPONSE_TYPE_CODE {
            return Ok(self.redirect_error(&request.redirect_uri, "unsupported_response_type", state));
        }

        let app = self.database.get_app(&request.client_id).await?;
        let app = match policy::require_usable_app(app, Utc::now()) {
            Ok(app) => app,
            Err(error) => {
                return Ok(self.redirect_error(&request.redirect_uri, &error.error, state));
            }
        };

        if !self
            .database
            .is_trusted_uri(&app.id, &request.redirect_uri)
            .await?
        {
            warn!(
                client_id = %app.id,
                "Authorization request with unregistered redirect_uri refused"
            );
            return Ok(AuthorizeOutcome::Reject(OAuth2Error::invalid_request(
                "redirect_uri is not registered for this application",
            )));
        }

        // PKCE method only matters when a challenge is present; default plain
        let code_challenge = request
            .code_challenge
            .as_deref()
            .filter(|c| !c.is_empty());
        let code_challenge_method = code_challenge.map(|_| {
            request
                .code_challenge_method
                .as_deref()
                .unwrap_or(oauth::PKCE_METHOD_PLAIN)
        });
        if let Some(method) = code_challenge_method {
            if !policy::is_supported_challenge_method(method) {
                return Ok(AuthorizeOutcome::Reject(OAuth2Error::invalid_request(
                    "Unsupported code_challenge_method",
                )));
            }
        }

        let session_id = ids::generate_token();
        self.database
            .create_auth_code_session(
                &app.id,
                &session_id,
                &request.redirect_uri,
                code_challenge,
                code_challenge_method,
                state,
            )
            .await?;

        debug!(client_id = %app.id, session_id = %session_id, "Authorization session created");
        Ok(AuthorizeOutcome::Redirect(self.consent_page_url(&session_id)))
    }

    /// Consent decision for a code-flow session (POST /authorize/consent/redirect)
    ///
    /// Idempotent for terminal sessions: authorized sessions answer with the
    /// original code URL, denied sessions with the error URL, and spent or
    /// expired sessions with a neutral URL back to the auth page.
    ///
    /// # Errors
    /// Returns 400-mapped errors for unknown or non-code-flow sessions
    pub async fn consent_redirect(
        &self,
        username: &str,
        request: &ConsentRequest,
    ) -> AppResult<ConsentRedirectResponse> {
        let session = self
            .database
            .get_by_session_id(&request.session_id)
            .await?
            .ok_or_else(|| AppError::invalid_input("Invalid session"))?;

        if session.flow_type != FlowType::AuthorizationCode {
            return Err(AppError::invalid_input(
                "Session does not belong to the authorization code flow",
            ));
        }

        let redirect_uri = session
            .redirect_uri
            .clone()
            .ok_or_else(|| AppError::internal("Code-flow session without redirect_uri"))?;
        let state = session.state.as_deref();

        match session.status {
            SessionStatus::Pending => {}
            SessionStatus::Authorized => {
                // Replayed approve: answer with the URL the first call produced
                let code = session
                    .auth_code
                    .clone()
                    .ok_or_else(|| AppError::internal("Authorized session without auth_code"))?;
                return Ok(ConsentRedirectResponse {
                    redirect_url: append_params(
                        &redirect_uri,
                        &[("code", &code)],
                        state,
                    ),
                });
            }
            SessionStatus::Denied => {
                return Ok(ConsentRedirectResponse {
                    redirect_url: append_params(
                        &redirect_uri,
                        &[("error", "access_denied")],
                        state,
                    ),
                });
            }
            SessionStatus::Consumed | SessionStatus::Expired => {
                return Ok(ConsentRedirectResponse {
                    redirect_url: self.consent_page_url(&session.session_id),
                });
            }
        }

        if !request.approve {
            self.database
                .update_status(&session.session_id, SessionStatus::Denied, Some(username))
                .await?;
            info!(client_id = %session.client_id, username, "Authorization denied by user");
            return Ok(ConsentRedirectResponse {
                redirect_url: append_params(&redirect_uri, &[("error", "access_denied")], state),
            });
        }

        let auth_code = ids::generate_token();
        self.database
            .attach_auth_code(&session.session_id, &auth_code, username)
            .await?;
        info!(client_id = %session.client_id, username, "Authorization approved by user");

        Ok(ConsentRedirectResponse {
            redirect_url: append_params(&redirect_uri, &[("code", &auth_code)], state),
        })
    }

    /// Consent decision for a device-flow session (POST /authorize/request/consent)
    ///
    /// # Errors
    /// Returns 400-mapped errors for unknown sessions, code-flow sessions,
    /// or sessions that already left `pending`
    pub async fn consent_device(
        &self,
        username: &str,
        request: &ConsentRequest,
    ) -> AppResult<ConsentMessageResponse> {
        let session = self
            .database
            .get_by_session_id(&request.session_id)
            .await?
            .ok_or_else(|| AppError::invalid_input("Invalid session"))?;

        if session.flow_type != FlowType::DeviceCode {
            return Err(AppError::invalid_input(
                "Use the redirect consent endpoint for authorization code sessions",
            ));
        }

        let status = if request.approve {
            SessionStatus::Authorized
        } else {
            SessionStatus::Denied
        };
        self.database
            .update_status(&session.session_id, status, Some(username))
            .await?;

        info!(
            client_id = %session.client_id,
            username,
            approved = request.approve,
            "Device flow consent recorded"
        );
        Ok(ConsentMessageResponse {
            message: "Consent recorded".to_owned(),
        })
    }

    /// Handle the token request (POST /oauth2/token)
    ///
    /// # Errors
    /// Returns a [`TokenError`]: protocol errors per grant, internal faults otherwise
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, TokenError> {
        match request.grant_type.as_str() {
            oauth::GRANT_TYPE_AUTHORIZATION_CODE => self.exchange_auth_code(request).await,
            oauth::GRANT_TYPE_DEVICE_CODE => self.poll_device_code(request).await,
            _ => Err(OAuth2Error::unsupported_grant_type().into()),
        }
    }

    /// Authorization-code grant: verify client auth, consume the code once, mint tokens
    async fn exchange_auth_code(&self, request: TokenRequest) -> Result<TokenResponse, TokenError> {
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("Missing code"))?;
        let client_id = request
            .client_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("Missing client_id"))?;

        let session = self
            .database
            .get_by_auth_code(code)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid or expired authorization code"))?;

        if session.status != SessionStatus::Authorized {
            return Err(OAuth2Error::invalid_grant("Invalid or expired authorization code").into());
        }

        if session.client_id != client_id {
            warn!(
                session_client = %session.client_id,
                presented_client = %client_id,
                "Authorization code presented by the wrong client"
            );
            return Err(
                OAuth2Error::invalid_grant("Authorization code was issued to another client")
                    .into(),
            );
        }

        match policy::resolve_client_auth(&session) {
            policy::ClientAuthMethod::Pkce => {
                let verifier = request
                    .code_verifier
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        OAuth2Error::invalid_request("code_verifier is required for this request")
                    })?;
                let challenge = session.code_challenge.as_deref().unwrap_or_default();
                let method = session
                    .code_challenge_method
                    .as_deref()
                    .unwrap_or(oauth::PKCE_METHOD_PLAIN);
                policy::check_pkce(challenge, method, verifier)?;
            }
            policy::ClientAuthMethod::ClientSecret => {
                let secret = request
                    .client_secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(OAuth2Error::invalid_client)?;
                if !self
                    .database
                    .validate_client_secret(&session.client_id, secret)
                    .await?
                {
                    warn!(client_id = %session.client_id, "Client secret validation failed");
                    return Err(OAuth2Error::invalid_client().into());
                }
            }
        }

        // Single-use gate: the conditional update lets exactly one exchange win
        if !self.database.consume_session(&session.session_id).await? {
            return Err(OAuth2Error::invalid_grant("Authorization code already used").into());
        }

        self.issue_tokens(&session).await
    }

    /// Device-code grant: rate-limited poll until the user decides
    async fn poll_device_code(&self, request: TokenRequest) -> Result<TokenResponse, TokenError> {
        let device_code = request
            .device_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuth2Error::invalid_request("Missing device_code"))?;

        let session = self
            .database
            .get_by_device_code(device_code)
            .await?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid device_code"))?;

        if session.status == SessionStatus::Consumed {
            return Err(OAuth2Error::invalid_grant("Device code already used").into());
        }

        if let Some(client_id) = request.client_id.as_deref().filter(|c| !c.is_empty()) {
            if session.client_id != client_id {
                return Err(OAuth2Error::invalid_client().into());
            }
        }

        let now = Utc::now();
        if let Some(last_poll) = session.last_poll {
            if now - last_poll < Duration::seconds(limits::DEVICE_POLL_INTERVAL_SECS) {
                return Err(OAuth2Error::slow_down().into());
            }
        }
        // Compare-and-set on the observed value; a racing poll gets slow_down
        if !self
            .database
            .update_poll(&session.session_id, session.last_poll, now)
            .await?
        {
            return Err(OAuth2Error::slow_down().into());
        }

        match session.status {
            SessionStatus::Pending => Err(OAuth2Error::authorization_pending().into()),
            SessionStatus::Denied => Err(OAuth2Error::access_denied().into()),
            SessionStatus::Expired => Err(OAuth2Error::expired_token().into()),
            SessionStatus::Authorized => {
                if !self.database.consume_session(&session.session_id).await? {
                    return Err(OAuth2Error::invalid_grant("Device code already used").into());
                }
                self.issue_tokens(&session).await
            }
            // Consumed is handled above; nothing else exists
            SessionStatus::Consumed => {
                Err(AppError::internal("Unreachable session status in device poll").into())
            }
        }
    }

    /// Initiate the device flow (POST /oauth2/devicecode)
    ///
    /// # Errors
    /// Returns protocol errors for unknown, suspended, or flow-disabled apps
    pub async fn device_initiate(
        &self,
        client_id: &str,
    ) -> Result<DeviceAuthorizationResponse, TokenError> {
        let app = self.database.get_app(client_id).await?;
        let app = policy::require_usable_app(app, Utc::now())?;
        policy::require_device_flow_enabled(&app)?;

        let session_id = ids::generate_token();
        let device_code = ids::generate_token();
        let user_code = ids::generate_user_code();

        self.database
            .create_device_flow_session(&app.id, &session_id, &device_code, &user_code)
            .await?;

        info!(client_id = %app.id, session_id = %session_id, "Device flow initiated");

        Ok(DeviceAuthorizationResponse {
            device_code,
            verification_uri: format!("{}/auth", self.frontend_url),
            verification_uri_complete: format!(
                "{}/auth?user_code={user_code}",
                self.frontend_url
            ),
            user_code,
            interval: limits::DEVICE_POLL_INTERVAL_SECS.unsigned_abs(),
            expires_in: limits::DEVICE_CODE_EXPIRES_IN_SECS,
        })
    }

    /// Session details for the consent UI (GET /authorize/request)
    ///
    /// # Errors
    /// Returns 404 for unknown sessions
    pub async fn session_details(&self, session_id: &str) -> AppResult<SessionDetailsResponse> {
        let session = self
            .database
            .get_by_session_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("Unknown session"))?;

        Ok(details_from(&session))
    }

    /// Pending-session details by user code (GET /authorize/request/by-user-code)
    ///
    /// # Errors
    /// Returns 400 when no pending session matches the code
    pub async fn session_details_by_user_code(
        &self,
        user_code: &str,
    ) -> AppResult<SessionDetailsResponse> {
        let session = self
            .database
            .get_by_user_code(user_code)
            .await?
            .ok_or_else(|| AppError::invalid_input("Invalid userCode"))?;

        Ok(details_from(&session))
    }

    /// Mint the access and ID tokens for a freshly consumed session
    async fn issue_tokens(
        &self,
        session: &AuthorizationSession,
    ) -> Result<TokenResponse, TokenError> {
        let username = session
            .username
            .as_deref()
            .ok_or_else(|| AppError::internal("Authorized session without username"))?;

        let jwks: Arc<JwksManager> =
            shared_signer().map_err(|e| AppError::internal(e.to_string()))?;

        let access_token = self
            .auth_manager
            .sign_default_access_token(&jwks, &session.client_id, username)
            .map_err(|e| AppError::internal(format!("Failed to sign access token: {e}")))?;
        let id_token = self
            .auth_manager
            .sign_id_token(&jwks, &session.client_id, username, None)
            .map_err(|e| AppError::internal(format!("Failed to sign ID token: {e}")))?;

        // Login history is an external concern; issuance must not fail on it
        if let Err(e) = self.database.record_login(username, &session.client_id).await {
            warn!(client_id = %session.client_id, "Failed to record login event: {e}");
        }

        info!(client_id = %session.client_id, username, "Tokens issued");

        Ok(TokenResponse {
            token_type: oauth::TOKEN_TYPE_BEARER.to_owned(),
            access_token,
            id_token,
            expires_in: limits::ACCESS_TOKEN_EXPIRES_IN_SECS,
        })
    }

    /// Redirect back to the client with an error code
    fn redirect_error(
        &self,
        redirect_uri: &str,
        error: &str,
        state: Option<&str>,
    ) -> AuthorizeOutcome {
        AuthorizeOutcome::Redirect(append_params(redirect_uri, &[("error", error)], state))
    }
}

fn details_from(session: &AuthorizationSession) -> SessionDetailsResponse {
    SessionDetailsResponse {
        session_id: session.session_id.clone(),
        app_id: session.client_id.clone(),
        username: session.username.clone(),
        status: session.status.as_str().to_owned(),
        expires_at: session.expires_at,
    }
}

/// Append query parameters to a target that may already carry a query string
///
/// Values are percent-encoded; `state` is appended last when present.
fn append_params(target: &str, params: &[(&str, &str)], state: Option<&str>) -> String {
    let mut url = target.to_owned();
    let mut separator = if url.contains('?') { '&' } else { '?' };

    let mut pairs: Vec<(&str, &str)> = params.to_vec();
    if let Some(state) = state {
        pairs.push(("state", state));
    }

    for (key, value) in pairs {
        url.push(separator);
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_params_plain_target() {
        let url = append_params("https://client.example/cb", &[("code", "abc123")], Some("xyz"));
        assert_eq!(url, "https://client.example/cb?code=abc123&state=xyz");
    }

    #[test]
    fn test_append_params_existing_query() {
        let url = append_params(
            "https://client.example/cb?tenant=1",
            &[("error", "access_denied")],
            None,
        );
        assert_eq!(url, "https://client.example/cb?tenant=1&error=access_denied");
    }

    #[test]
    fn test_append_params_percent_encodes_state() {
        let url = append_params(
            "https://client.example/cb",
            &[("error", "access_denied")],
            Some("a b&c=d"),
        );
        assert_eq!(
            url,
            "https://client.example/cb?error=access_denied&state=a%20b%26c%3Dd"
        );
    }
}
