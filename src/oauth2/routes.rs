// ABOUTME: OAuth 2.0 HTTP route handlers for the warp web framework
// ABOUTME: Protocol endpoints, OIDC discovery, and JWKS distribution
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::endpoints::{AuthorizationServer, AuthorizeOutcome, TokenError};
use super::models::{AuthorizeRequest, OAuth2Error, TokenRequest};
use crate::config::ServerConfig;
use crate::crypto::shared_signer;
use crate::errors::ErrorResponse;
use base64::{engine::general_purpose, Engine};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// OAuth 2.0 protocol route filters: /oauth2/* and /.well-known/*
pub fn oauth2_routes(
    server: Arc<AuthorizationServer>,
    config: Arc<ServerConfig>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let authorize_route = warp::path!("oauth2" / "authorize")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_server(server.clone()))
        .and_then(handle_authorize);

    let devicecode_route = warp::path!("oauth2" / "devicecode")
        .and(warp::post())
        .and(warp::body::form::<HashMap<String, String>>())
        .and(with_server(server.clone()))
        .and_then(handle_devicecode);

    let token_route = warp::path!("oauth2" / "token")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::form::<HashMap<String, String>>())
        .and(with_server(server))
        .and_then(handle_token);

    let discovery_route = warp::path!(".well-known" / "openid-configuration")
        .and(warp::get())
        .and(with_config(config))
        .and_then(handle_discovery);

    let jwks_route = warp::path!(".well-known" / "jwks.json")
        .and(warp::get())
        .and_then(handle_jwks);

    authorize_route
        .or(devicecode_route)
        .or(token_route)
        .or(discovery_route)
        .or(jwks_route)
}

/// Helper to inject the authorization server
fn with_server(
    server: Arc<AuthorizationServer>,
) -> impl Filter<Extract = (Arc<AuthorizationServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}

/// Helper to inject the server configuration
fn with_config(
    config: Arc<ServerConfig>,
) -> impl Filter<Extract = (Arc<ServerConfig>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || config.clone())
}

/// Handle the authorization request (GET /oauth2/authorize)
async fn handle_authorize(
    params: HashMap<String, String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let request = AuthorizeRequest {
        response_type: params.get("response_type").cloned().unwrap_or_default(),
        client_id: params.get("client_id").cloned().unwrap_or_default(),
        redirect_uri: params.get("redirect_uri").cloned().unwrap_or_default(),
        state: params.get("state").cloned(),
        code_challenge: params.get("code_challenge").cloned(),
        code_challenge_method: params.get("code_challenge_method").cloned(),
    };

    match server.authorize(request).await {
        Ok(AuthorizeOutcome::Redirect(location)) => {
            debug!("Authorization request redirecting to {location}");
            let reply = warp::reply::with_header(warp::reply(), "Location", location);
            Ok(Box::new(warp::reply::with_status(reply, StatusCode::FOUND)))
        }
        Ok(AuthorizeOutcome::Reject(oauth_error)) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&oauth_error),
            StatusCode::BAD_REQUEST,
        ))),
        Err(app_error) => {
            error!("Authorization request failed: {app_error}");
            Ok(Box::new(warp::reply::with_status(
                warp::reply::json(&ErrorResponse::new("Internal error")),
                StatusCode::INTERNAL_SERVER_ERROR,
            )))
        }
    }
}

/// Handle device flow initiation (POST /oauth2/devicecode)
async fn handle_devicecode(
    form: HashMap<String, String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let Some(client_id) = form.get("client_id").filter(|c| !c.is_empty()) else {
        return Ok(oauth_error_reply(&OAuth2Error::invalid_request(
            "Missing client_id",
        )));
    };

    match server.device_initiate(client_id).await {
        Ok(response) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        ))),
        Err(error) => Ok(token_error_reply(error)),
    }
}

/// Handle the token request (POST /oauth2/token)
async fn handle_token(
    auth_header: Option<String>,
    form: HashMap<String, String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let request = match parse_token_request(&form, auth_header.as_deref()) {
        Ok(request) => request,
        Err(oauth_error) => {
            warn!("Token request parsing failed: {}", oauth_error.error);
            return Ok(oauth_error_reply(&oauth_error));
        }
    };

    match server.token(request).await {
        Ok(response) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        ))),
        Err(error) => Ok(token_error_reply(error)),
    }
}

/// OIDC discovery document (GET /.well-known/openid-configuration)
async fn handle_discovery(config: Arc<ServerConfig>) -> Result<Box<dyn Reply>, Rejection> {
    let issuer = config.backend_url.clone();
    Ok(Box::new(warp::reply::json(&serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "device_authorization_endpoint": format!("{issuer}/oauth2/devicecode"),
        "userinfo_endpoint": format!("{issuer}/myprofile"),
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "response_types_supported": ["code", "token", "id_token"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"],
        "scopes_supported": ["openid", "profile", "email"],
        "token_endpoint_auth_methods_supported": [
            "client_secret_basic",
            "client_secret_post",
            "none"
        ],
        "grant_types_supported": [
            "authorization_code",
            "urn:ietf:params:oauth:grant-type:device_code"
        ],
        "code_challenge_methods_supported": ["plain", "S256"]
    }))))
}

/// JWKS distribution (GET /.well-known/jwks.json)
async fn handle_jwks() -> Result<Box<dyn Reply>, Rejection> {
    match shared_signer() {
        Ok(manager) => Ok(Box::new(warp::reply::json(&manager.jwks()))),
        Err(e) => {
            error!("JWKS unavailable: {e}");
            Ok(Box::new(warp::reply::with_status(
                warp::reply::json(&ErrorResponse::new("Internal error")),
                StatusCode::INTERNAL_SERVER_ERROR,
            )))
        }
    }
}

/// Parse form fields plus optional HTTP Basic credentials into a `TokenRequest`
fn parse_token_request(
    form: &HashMap<String, String>,
    auth_header: Option<&str>,
) -> Result<TokenRequest, OAuth2Error> {
    let grant_type = form
        .get("grant_type")
        .filter(|g| !g.is_empty())
        .cloned()
        .ok_or_else(|| OAuth2Error::invalid_request("Missing grant_type"))?;

    let basic = auth_header.and_then(parse_basic_auth);

    let client_id = form
        .get("client_id")
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| basic.as_ref().map(|(user, _)| user.clone()));
    let client_secret = form
        .get("client_secret")
        .filter(|v| !v.is_empty())
        .cloned()
        .or_else(|| basic.as_ref().map(|(_, pass)| pass.clone()));

    Ok(TokenRequest {
        grant_type,
        code: form.get("code").cloned(),
        client_id,
        client_secret,
        code_verifier: form.get("code_verifier").cloned(),
        device_code: form.get("device_code").cloned(),
    })
}

/// Decode `Basic base64(user:pass)` credentials
fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}

/// 400 reply with an OAuth protocol error body
fn oauth_error_reply(error: &OAuth2Error) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::json(error),
        StatusCode::BAD_REQUEST,
    ))
}

/// Map a token endpoint failure to its HTTP reply
fn token_error_reply(error: TokenError) -> Box<dyn Reply> {
    match error {
        TokenError::OAuth(oauth_error) => oauth_error_reply(&oauth_error),
        TokenError::Internal(app_error) => {
            error!("Token endpoint internal failure: {app_error}");
            Box::new(warp::reply::with_status(
                warp::reply::json(&ErrorResponse::new("Internal error")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}
