// ABOUTME: Server entrypoint: configuration, logging, database, signing key, HTTP serve
// ABOUTME: Shuts down cleanly on ctrl-c
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::Result;
use passgate::auth::AuthManager;
use passgate::config::ServerConfig;
use passgate::crypto;
use passgate::database::Database;
use passgate::logging;
use passgate::routes;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(ServerConfig::from_env());
    logging::init_logging(&config.logging())?;

    info!(
        port = config.http_port,
        issuer = %config.backend_url,
        "Starting passgate server"
    );

    let database = Database::connect(&config.database_url).await?;

    // Generate the signing key before accepting traffic
    let signer = crypto::init_shared_signer()?;
    info!(kid = %signer.signing_key().kid, "Token signer ready");

    let auth_manager = Arc::new(AuthManager::new(config.backend_url.clone()));

    let addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let filter = routes::routes(database, auth_manager, config);

    let (bound, serve) =
        warp::serve(filter).bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        });

    info!(%bound, "HTTP server listening");
    serve.await;

    Ok(())
}
