// ABOUTME: OAuth 2.0 / OIDC authorization engine
// ABOUTME: Authorization code flow with PKCE, device authorization flow, policy gate, HTTP surface
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Authorization server driving both flow state machines
pub mod endpoints;
/// Wire-level request/response types and the RFC error shape
pub mod models;
/// Trust and policy gate
pub mod policy;
/// warp route filters for the protocol endpoints
pub mod routes;

pub use endpoints::{AuthorizationServer, AuthorizeOutcome, TokenError};
pub use models::{
    AuthorizeRequest, ConsentMessageResponse, ConsentRedirectResponse, ConsentRequest,
    DeviceAuthorizationResponse, OAuth2Error, SessionDetailsResponse, TokenRequest, TokenResponse,
};
pub use routes::oauth2_routes;
