use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use sourceindex::config::Config;
use sourceindex::host::HostServer;
use sourceindex::index::retry::RetryPolicy;

use super::open_database;

/// Run the host server until Ctrl-C
pub async fn serve(config: &Config, bind: Option<String>) -> Result<()> {
    let db = open_database(config)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    println!("sourceindex host v{}", env!("CARGO_PKG_VERSION"));
    println!("Listening on: {}", listener.local_addr()?);
    println!("Database: {}", db.path().display());
    println!(
        "Self registration: {}",
        if config.server.allow_self_registration { "enabled" } else { "disabled" }
    );

    let server = Arc::new(HostServer::new(
        db,
        RetryPolicy::from(&config.retry),
        config.server.clone(),
    ));
    server
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Host server stopped");
    Ok(())
}
