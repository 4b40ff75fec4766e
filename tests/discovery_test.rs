// ABOUTME: Tests for the OIDC discovery document, JWKS publication, and error surfaces
// ABOUTME: Proves a signed token verifies against the advertised JWKS key
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use anyhow::Result;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use passgate::crypto::shared_signer;
use serde_json::Value;

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("JSON body")
}

#[tokio::test]
async fn test_discovery_document() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app = passgate::routes::routes(database, auth_manager, common::create_test_config());

    let resp = warp::test::request()
        .method("GET")
        .path("/.well-known/openid-configuration")
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body = body_json(resp.body());

    assert_eq!(body["issuer"], common::TEST_ISSUER);
    assert_eq!(
        body["authorization_endpoint"],
        format!("{}/oauth2/authorize", common::TEST_ISSUER)
    );
    assert_eq!(
        body["token_endpoint"],
        format!("{}/oauth2/token", common::TEST_ISSUER)
    );
    assert_eq!(
        body["device_authorization_endpoint"],
        format!("{}/oauth2/devicecode", common::TEST_ISSUER)
    );
    assert_eq!(
        body["jwks_uri"],
        format!("{}/.well-known/jwks.json", common::TEST_ISSUER)
    );
    assert_eq!(body["subject_types_supported"], serde_json::json!(["public"]));
    assert_eq!(
        body["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );
    assert_eq!(
        body["code_challenge_methods_supported"],
        serde_json::json!(["plain", "S256"])
    );
    assert_eq!(
        body["grant_types_supported"],
        serde_json::json!([
            "authorization_code",
            "urn:ietf:params:oauth:grant-type:device_code"
        ])
    );
    assert_eq!(
        body["token_endpoint_auth_methods_supported"],
        serde_json::json!(["client_secret_basic", "client_secret_post", "none"])
    );
    Ok(())
}

#[tokio::test]
async fn test_signed_token_verifies_against_published_jwks() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app = passgate::routes::routes(
        database,
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path("/.well-known/jwks.json")
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let jwks = body_json(resp.body());
    let key = &jwks["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["use"], "sig");

    // Sign a token and check its kid matches the advertised key
    let signer = shared_signer()?;
    let token = auth_manager.sign_default_access_token(&signer, "app_A", "alice")?;
    let header = jsonwebtoken::decode_header(&token)?;
    assert_eq!(header.kid.as_deref(), key["kid"].as_str());

    // Verify the signature using only the published JWKS material
    let decoding_key =
        DecodingKey::from_rsa_components(key["n"].as_str().unwrap(), key["e"].as_str().unwrap())?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    validation.set_issuer(&[common::TEST_ISSUER]);

    let data = jsonwebtoken::decode::<Value>(&token, &decoding_key, &validation)?;
    assert_eq!(data.claims["sub"], "alice");
    assert_eq!(data.claims["aud"], "app_A");
    assert_eq!(data.claims["appId"], "app_A");
    assert_eq!(data.claims["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app = passgate::routes::routes(database, auth_manager, common::create_test_config());

    let resp = warp::test::request().method("GET").path("/health").reply(&app).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp.body())["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_error_surfaces() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app = passgate::routes::routes(database, auth_manager.clone(), common::create_test_config());

    // Unknown route
    let resp = warp::test::request()
        .method("GET")
        .path("/definitely/not/here")
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(body_json(resp.body())["message"], "Not Found");

    // Consent without a bearer token
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/request/consent")
        .json(&serde_json::json!({ "sessionId": "whatever", "approve": true }))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 401);
    assert_eq!(body_json(resp.body())["message"], "Unauthorized");

    // A token issued to a regular app is not a user session
    let jwks = shared_signer()?;
    let app_token = auth_manager.sign_default_access_token(&jwks, "some_app", "alice")?;
    let resp = warp::test::request()
        .method("GET")
        .path("/authorize/request?sessionId=whatever")
        .header("authorization", common::bearer(&app_token))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 401);

    // Unknown session id with a valid user session
    let user_token = common::user_session_token(&auth_manager, "alice")?;
    let resp = warp::test::request()
        .method("GET")
        .path("/authorize/request?sessionId=missing")
        .header("authorization", common::bearer(&user_token))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 404);
    Ok(())
}
