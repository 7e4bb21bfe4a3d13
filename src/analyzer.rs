//! Out-of-process language analyzers.
//!
//! Analyzers never run inside the host. Each one is an executable that is
//! handed the host address and a pre-registered client id, connects back and
//! streams its tokens over RPC.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::{AnalyzerConfig, Config, ServerConfig};
use crate::host::{ClientId, HostServer};
use crate::index::db::IndexDatabase;
use crate::index::retry::RetryPolicy;

/// What the host needs to know about a language analyzer
pub trait LanguageAnalyzer: Send + Sync {
    /// Language name, used as the client id prefix
    fn name(&self) -> &str;

    /// Human readable description of the analyzer and its options
    fn describe_options(&self) -> String;

    /// Start the analyzer against a running host
    fn launch(&self, server_addr: SocketAddr, client_id: &ClientId, args: &[String]) -> Result<Child>;
}

/// An analyzer configured as an external command
#[derive(Debug, Clone)]
pub struct ExternalAnalyzer {
    language: String,
    config: AnalyzerConfig,
}

impl ExternalAnalyzer {
    pub fn new(language: impl Into<String>, config: AnalyzerConfig) -> Self {
        Self {
            language: language.into(),
            config,
        }
    }

    /// Arguments passed to the command: configured args, host address,
    /// client id, then the user's args
    pub fn command_args(&self, server_addr: SocketAddr, client_id: &ClientId, args: &[String]) -> Vec<String> {
        let mut all = self.config.args.clone();
        all.push(server_addr.to_string());
        all.push(client_id.to_string());
        all.extend(args.iter().cloned());
        all
    }
}

impl LanguageAnalyzer for ExternalAnalyzer {
    fn name(&self) -> &str {
        &self.language
    }

    fn describe_options(&self) -> String {
        match &self.config.description {
            Some(description) => description.clone(),
            None => format!("{} {}", self.config.command, self.config.args.join(" "))
                .trim_end()
                .to_string(),
        }
    }

    fn launch(&self, server_addr: SocketAddr, client_id: &ClientId, args: &[String]) -> Result<Child> {
        let child = Command::new(&self.config.command)
            .args(self.command_args(server_addr, client_id, args))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to launch analyzer '{}'", self.config.command))?;
        info!("Launched {} analyzer (pid {:?})", self.language, child.id());
        Ok(child)
    }
}

/// Analyzers declared in the configuration, by language name
pub fn configured_analyzers(config: &Config) -> Vec<ExternalAnalyzer> {
    config
        .analyzers
        .iter()
        .map(|(language, analyzer)| ExternalAnalyzer::new(language.clone(), analyzer.clone()))
        .collect()
}

/// Server settings for a host that serves a single analyzer. The child's
/// lifetime bounds its session, so idle sessions are never reaped.
fn private_host_config(server: &ServerConfig) -> ServerConfig {
    ServerConfig {
        idle_timeout_secs: 0,
        ..server.clone()
    }
}

/// Run one analyzer to completion against a private host server.
///
/// The session is registered before the analyzer starts, so its first call
/// can already use the client id it was given.
pub async fn run_analyzer(
    db: IndexDatabase,
    config: &Config,
    analyzer: &dyn LanguageAnalyzer,
    args: &[String],
) -> Result<ExitStatus> {
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    let addr = listener.local_addr()?;

    let server = Arc::new(HostServer::new(
        db,
        RetryPolicy::from(&config.retry),
        private_host_config(&config.server),
    ));
    let client_id = ClientId::create(analyzer.name());
    server.create_indexer(client_id.clone())?;

    let (stop, stopped) = oneshot::channel::<()>();
    let serving = tokio::spawn(server.clone().serve(listener, async move {
        let _ = stopped.await;
    }));

    let outcome = match analyzer.launch(addr, &client_id, args) {
        Ok(mut child) => child.wait().await.context("Failed to wait for analyzer"),
        Err(e) => Err(e),
    };

    let _ = stop.send(());
    serving.await??;

    if let Some(indexer) = server.unregister(&client_id) {
        if indexer.pending_work().is_some() {
            warn!("{} analyzer exited before finishing its project", analyzer.name());
        }
    }

    let status = outcome?;
    info!("{} analyzer exited with {}", analyzer.name(), status);
    Ok(status)
}
