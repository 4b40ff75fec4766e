// ABOUTME: HTTP route composition: consent endpoints, session lookups, and health
// ABOUTME: Consent and lookup routes require an authenticated end-user session token
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::crypto::shared_signer;
use crate::database::Database;
use crate::errors::{AppError, ErrorCode, ErrorResponse};
use crate::oauth2::{oauth2_routes, AuthorizationServer, ConsentRequest};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// All HTTP routes of the server, with rejection recovery applied
pub fn routes(
    database: Database,
    auth_manager: Arc<AuthManager>,
    config: Arc<ServerConfig>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let server = Arc::new(AuthorizationServer::new(
        database,
        auth_manager.clone(),
        &config.frontend_url,
    ));

    oauth2_routes(server.clone(), config)
        .or(consent_routes(server, auth_manager))
        .or(health_route())
        .recover(handle_rejection)
}

/// Consent and session-lookup routes for the authenticated consent UI
pub fn consent_routes(
    server: Arc<AuthorizationServer>,
    auth_manager: Arc<AuthManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let session_details = warp::path!("authorize" / "request")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_server(server.clone()))
        .and(with_auth_manager(auth_manager.clone()))
        .and_then(handle_session_details);

    let session_by_user_code = warp::path!("authorize" / "request" / "by-user-code")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_server(server.clone()))
        .and(with_auth_manager(auth_manager.clone()))
        .and_then(handle_session_by_user_code);

    let device_consent = warp::path!("authorize" / "request" / "consent")
        .and(warp::post())
        .and(warp::body::json::<ConsentRequest>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_server(server.clone()))
        .and(with_auth_manager(auth_manager.clone()))
        .and_then(handle_device_consent);

    let redirect_consent = warp::path!("authorize" / "consent" / "redirect")
        .and(warp::post())
        .and(warp::body::json::<ConsentRequest>())
        .and(warp::header::optional::<String>("authorization"))
        .and(with_server(server))
        .and(with_auth_manager(auth_manager))
        .and_then(handle_redirect_consent);

    session_details
        .or(session_by_user_code)
        .or(device_consent)
        .or(redirect_consent)
}

/// Liveness endpoint
pub fn health_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "status": "ok",
            "service": crate::constants::service_names::SERVICE,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    })
}

fn with_server(
    server: Arc<AuthorizationServer>,
) -> impl Filter<Extract = (Arc<AuthorizationServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

fn with_auth_manager(
    auth_manager: Arc<AuthManager>,
) -> impl Filter<Extract = (Arc<AuthManager>,), Error = Infallible> + Clone {
    warp::any().map(move || auth_manager.clone())
}

/// Resolve the authenticated end-user behind a bearer header
fn authenticate(
    auth_manager: &AuthManager,
    auth_header: Option<&str>,
) -> Result<String, AppError> {
    let jwks = shared_signer().map_err(|e| AppError::internal(e.to_string()))?;
    auth_manager
        .authenticate_user_session(&jwks, auth_header)
        .map(|user| user.username)
}

async fn handle_session_details(
    params: HashMap<String, String>,
    auth_header: Option<String>,
    server: Arc<AuthorizationServer>,
    auth_manager: Arc<AuthManager>,
) -> Result<Box<dyn Reply>, Rejection> {
    if let Err(err) = authenticate(&auth_manager, auth_header.as_deref()) {
        return Ok(app_error_reply(&err));
    }

    let Some(session_id) = params.get("sessionId").filter(|s| !s.is_empty()) else {
        return Ok(app_error_reply(&AppError::invalid_input("Missing sessionId")));
    };

    match server.session_details(session_id).await {
        Ok(details) => Ok(Box::new(warp::reply::json(&details))),
        Err(err) => Ok(app_error_reply(&err)),
    }
}

async fn handle_session_by_user_code(
    params: HashMap<String, String>,
    auth_header: Option<String>,
    server: Arc<AuthorizationServer>,
    auth_manager: Arc<AuthManager>,
) -> Result<Box<dyn Reply>, Rejection> {
    if let Err(err) = authenticate(&auth_manager, auth_header.as_deref()) {
        return Ok(app_error_reply(&err));
    }

    let Some(user_code) = params.get("userCode").filter(|s| !s.is_empty()) else {
        return Ok(app_error_reply(&AppError::invalid_input("Missing userCode")));
    };

    match server.session_details_by_user_code(user_code).await {
        Ok(details) => Ok(Box::new(warp::reply::json(&details))),
        Err(err) => Ok(app_error_reply(&err)),
    }
}

async fn handle_device_consent(
    request: ConsentRequest,
    auth_header: Option<String>,
    server: Arc<AuthorizationServer>,
    auth_manager: Arc<AuthManager>,
) -> Result<Box<dyn Reply>, Rejection> {
    let username = match authenticate(&auth_manager, auth_header.as_deref()) {
        Ok(username) => username,
        Err(err) => return Ok(app_error_reply(&err)),
    };

    match server.consent_device(&username, &request).await {
        Ok(response) => Ok(Box::new(warp::reply::json(&response))),
        Err(err) => Ok(app_error_reply(&err)),
    }
}

async fn handle_redirect_consent(
    request: ConsentRequest,
    auth_header: Option<String>,
    server: Arc<AuthorizationServer>,
    auth_manager: Arc<AuthManager>,
) -> Result<Box<dyn Reply>, Rejection> {
    let username = match authenticate(&auth_manager, auth_header.as_deref()) {
        Ok(username) => username,
        Err(err) => return Ok(app_error_reply(&err)),
    };

    match server.consent_redirect(&username, &request).await {
        Ok(response) => Ok(Box::new(warp::reply::json(&response))),
        Err(err) => Ok(app_error_reply(&err)),
    }
}

/// Map an [`AppError`] to its JSON reply; internals never leak
fn app_error_reply(err: &AppError) -> Box<dyn Reply> {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = match err.code {
        ErrorCode::AuthRequired | ErrorCode::AuthInvalid | ErrorCode::AuthExpired => {
            "Unauthorized".to_owned()
        }
        ErrorCode::DatabaseError | ErrorCode::InternalError => {
            error!("Request failed: {err}");
            "Internal error".to_owned()
        }
        _ => err.message.clone(),
    };

    Box::new(warp::reply::with_status(
        warp::reply::json(&ErrorResponse::new(message)),
        status,
    ))
}

/// Convert unhandled rejections to the JSON error contract
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if err.is_not_found() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&ErrorResponse::new("Not Found")),
            StatusCode::NOT_FOUND,
        ));
    }

    if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
        || err.find::<warp::reject::MethodNotAllowed>().is_some()
    {
        return Ok(warp::reply::with_status(
            warp::reply::json(&json!({ "error": "invalid_request" })),
            StatusCode::BAD_REQUEST,
        ));
    }

    error!("Unhandled rejection: {err:?}");
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": "server_error" })),
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}
