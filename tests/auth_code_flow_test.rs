// ABOUTME: End-to-end tests for the authorization code flow with PKCE and client secrets
// ABOUTME: Covers consent, single-use codes, replay, verifier mismatch, and expiry
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use passgate::crypto::shared_signer;
use serde_json::Value;

// RFC 7636 appendix B test vector
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Query string for an authorize request against the seeded redirect URI
fn authorize_path(client_id: &str, challenge: Option<(&str, &str)>, state: &str) -> String {
    let mut path = format!(
        "/oauth2/authorize?response_type=code&client_id={client_id}&redirect_uri={}&state={state}",
        common::encode(common::TEST_REDIRECT_URI)
    );
    if let Some((challenge, method)) = challenge {
        path.push_str(&format!(
            "&code_challenge={challenge}&code_challenge_method={method}"
        ));
    }
    path
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix(&format!("{key}=")))
        .map(str::to_owned)
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("JSON body")
}

#[tokio::test]
async fn test_s256_flow_end_to_end() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Calendar", "alice").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    // Authorize redirects the browser to the consent UI
    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "xyz"))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 302);
    let location = resp.headers()["location"].to_str()?.to_owned();
    assert!(location.starts_with(&format!("{}/auth?session_id=", common::TEST_FRONTEND)));
    let session_id = query_param(&location, "session_id").unwrap();

    // The user approves on the consent UI
    let token = common::user_session_token(&auth_manager, "alice")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(redirect_url.starts_with(common::TEST_REDIRECT_URI));
    assert_eq!(query_param(&redirect_url, "state").as_deref(), Some("xyz"));
    let code = query_param(&redirect_url, "code").unwrap();

    // The client exchanges the code with its PKCE verifier
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body = body_json(resp.body());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 604_800);
    assert!(body["id_token"].as_str().is_some());

    // The access token validates against our signer and carries the right identity
    let jwks = shared_signer()?;
    let (client_id, username) =
        auth_manager.validate(&jwks, body["access_token"].as_str().unwrap())?;
    assert_eq!(client_id, app_id);
    assert_eq!(username, "alice");

    // Replay of the same code is refused and the session stays consumed
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_grant");

    let session = database.get_by_session_id(&session_id).await?.unwrap();
    assert_eq!(session.status.as_str(), "consumed");
    Ok(())
}

#[tokio::test]
async fn test_pkce_mismatch_keeps_code_usable() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Notes", "alice").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "s1"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "alice")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    // One mutated byte in the verifier
    let mut mutated = VERIFIER.to_owned();
    mutated.replace_range(0..1, "e");
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={mutated}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_grant");

    // The code was not burned; the session is still authorized
    let session = database.get_by_session_id(&session_id).await?.unwrap();
    assert_eq!(session.status.as_str(), "authorized");

    // A legitimate retry with the right verifier succeeds
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_plain_pkce_defaults_when_method_absent() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Wiki", "bob").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    // Challenge present, method omitted: plain
    let path = format!(
        "/oauth2/authorize?response_type=code&client_id={app_id}&redirect_uri={}&state=s&code_challenge=plain-challenge-value",
        common::encode(common::TEST_REDIRECT_URI)
    );
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 302);
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "bob")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    // Wrong byte rejected, exact value accepted
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier=plain-challenge-valuX"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);

    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier=plain-challenge-value"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_client_secret_required_without_pkce() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "CRM", "carol").await?;
    let (_, secret) = database.create_client_secret(&app_id, Some("primary")).await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, None, "st"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "carol")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    // No secret at all
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_client");

    // Wrong secret
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&client_secret=wrong"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_client");

    // Valid secret via HTTP Basic
    let credentials = base64_encode(&format!("{app_id}:{secret}"));
    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("authorization", format!("Basic {credentials}"))
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_untrusted_redirect_gets_400_not_redirect() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Mail", "dave").await?;
    let app = passgate::routes::routes(database, auth_manager, common::create_test_config());

    let path = format!(
        "/oauth2/authorize?response_type=code&client_id={app_id}&redirect_uri={}&state=s",
        common::encode("https://evil.example/cb")
    );
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 400);
    assert!(resp.headers().get("location").is_none());
    Ok(())
}

#[tokio::test]
async fn test_authorize_error_redirects() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Chat", "erin").await?;
    let app = passgate::routes::routes(database.clone(), auth_manager, common::create_test_config());

    // Unsupported response type goes back to the client
    let path = format!(
        "/oauth2/authorize?response_type=token&client_id={app_id}&redirect_uri={}&state=abc",
        common::encode(common::TEST_REDIRECT_URI)
    );
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 302);
    let location = resp.headers()["location"].to_str()?.to_owned();
    assert_eq!(
        query_param(&location, "error").as_deref(),
        Some("unsupported_response_type")
    );
    assert_eq!(query_param(&location, "state").as_deref(), Some("abc"));

    // Unknown client
    let path = format!(
        "/oauth2/authorize?response_type=code&client_id=nonexistent&redirect_uri={}&state=abc",
        common::encode(common::TEST_REDIRECT_URI)
    );
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 302);
    let location = resp.headers()["location"].to_str()?.to_owned();
    assert_eq!(query_param(&location, "error").as_deref(), Some("invalid_client"));

    // Suspended app
    database
        .set_suspension(&app_id, Some(Utc::now() + Duration::hours(1)))
        .await?;
    let path = format!(
        "/oauth2/authorize?response_type=code&client_id={app_id}&redirect_uri={}&state=abc",
        common::encode(common::TEST_REDIRECT_URI)
    );
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 302);
    let location = resp.headers()["location"].to_str()?.to_owned();
    assert_eq!(query_param(&location, "error").as_deref(), Some("access_denied"));

    // Missing redirect_uri is a plain 400
    let path = format!("/oauth2/authorize?response_type=code&client_id={app_id}");
    let resp = warp::test::request().method("GET").path(&path).reply(&app).await;
    assert_eq!(resp.status(), 400);
    Ok(())
}

#[tokio::test]
async fn test_expired_session_cannot_be_exchanged() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Docs", "frank").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "s"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "frank")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    // Push the deadline into the past; the next read marks it expired
    database
        .force_expire_at(&session_id, Utc::now() - Duration::seconds(1))
        .await?;

    let resp = warp::test::request()
        .method("GET")
        .path(&format!("/authorize/request?sessionId={session_id}"))
        .header("authorization", common::bearer(&token))
        .reply(&app)
        .await;
    assert_eq!(body_json(resp.body())["status"], "expired");

    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn test_consent_deny_and_idempotency() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Board", "grace").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "zz"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "grace")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": false }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    assert_eq!(
        query_param(&redirect_url, "error").as_deref(),
        Some("access_denied")
    );
    assert_eq!(query_param(&redirect_url, "state").as_deref(), Some("zz"));

    // Replaying the decision returns the same answer
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let replayed = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    assert_eq!(replayed, redirect_url);

    // Denied sessions cannot be exchanged
    let session = database.get_by_session_id(&session_id).await?.unwrap();
    assert_eq!(session.status.as_str(), "denied");
    Ok(())
}

#[tokio::test]
async fn test_consumed_session_consent_returns_neutral_url() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "Photos", "heidi").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "q"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "heidi")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={app_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 200);

    // After the code is spent, consent replay points back at the auth page
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let neutral = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(neutral.starts_with(&format!("{}/auth?session_id=", common::TEST_FRONTEND)));
    Ok(())
}

#[tokio::test]
async fn test_wrong_client_cannot_exchange() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app_id = common::seed_app(&database, "One", "ivan").await?;
    let other_id = common::seed_app(&database, "Two", "ivan").await?;
    let app = passgate::routes::routes(
        database.clone(),
        auth_manager.clone(),
        common::create_test_config(),
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&authorize_path(&app_id, Some((CHALLENGE, "S256")), "s"))
        .reply(&app)
        .await;
    let session_id = query_param(resp.headers()["location"].to_str()?, "session_id").unwrap();

    let token = common::user_session_token(&auth_manager, "ivan")?;
    let resp = warp::test::request()
        .method("POST")
        .path("/authorize/consent/redirect")
        .header("authorization", common::bearer(&token))
        .json(&serde_json::json!({ "sessionId": session_id, "approve": true }))
        .reply(&app)
        .await;
    let redirect_url = body_json(resp.body())["redirectUrl"]
        .as_str()
        .unwrap()
        .to_owned();
    let code = query_param(&redirect_url, "code").unwrap();

    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!(
            "grant_type=authorization_code&code={code}&client_id={other_id}&code_verifier={VERIFIER}"
        ))
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn test_unsupported_grant_type() -> Result<()> {
    let database = common::create_test_database().await?;
    let auth_manager = common::create_auth_manager();
    let app = passgate::routes::routes(database, auth_manager, common::create_test_config());

    let resp = warp::test::request()
        .method("POST")
        .path("/oauth2/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("grant_type=password&username=u&password=p")
        .reply(&app)
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(body_json(resp.body())["error"], "unsupported_grant_type");
    Ok(())
}

fn base64_encode(value: &str) -> String {
    use base64::{engine::general_purpose, Engine};
    general_purpose::STANDARD.encode(value)
}
