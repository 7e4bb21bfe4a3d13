// Host server: session registry and JSON-RPC front door

use anyhow::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{codes, HostError, IndexError};
use crate::host::client_id::ClientId;
use crate::host::logs::LanguageLogs;
use crate::host::protocol::{
    BeginFileParams, BeginProjectParams, ConnectParams, ConnectResult, EndFileParams, EndProjectParams,
    FileIdResult, IndexTokenParams, InitializeParams, Method, ProjectIdResult, RpcRequest, RpcResponse,
    WriteLogParams, JSONRPC_VERSION,
};
use crate::index::db::IndexDatabase;
use crate::index::retry::RetryPolicy;
use crate::session::Indexer;

/// Sessions created by `connect` on one connection
type ConnectionSessions = Mutex<Vec<ClientId>>;

/// Routes calls from any number of analyzers to their sessions
pub struct HostServer {
    db: IndexDatabase,
    retry: RetryPolicy,
    config: ServerConfig,
    indexers: DashMap<ClientId, Arc<Indexer>>,
    logs: LanguageLogs,
}

impl HostServer {
    pub fn new(db: IndexDatabase, retry: RetryPolicy, config: ServerConfig) -> Self {
        Self {
            db,
            retry,
            config,
            indexers: DashMap::new(),
            logs: LanguageLogs::new(),
        }
    }

    /// Register an existing session. An identity can only be registered once.
    pub fn register_indexer(&self, indexer: Arc<Indexer>) -> Result<(), HostError> {
        match self.indexers.entry(indexer.client_id().clone()) {
            Entry::Occupied(entry) => Err(HostError::DuplicateClient(entry.key().to_string())),
            Entry::Vacant(entry) => {
                info!("Registered session {}", indexer.client_id());
                entry.insert(indexer);
                Ok(())
            }
        }
    }

    /// Create a session with its own store writer and register it
    ///
    /// The writer is started before the registry entry is taken, so no shard
    /// lock is held while a connection opens. A lost race is a duplicate.
    pub fn create_indexer(&self, client_id: ClientId) -> Result<Arc<Indexer>, HostError> {
        if self.indexers.contains_key(&client_id) {
            return Err(HostError::DuplicateClient(client_id.to_string()));
        }

        let writer = self
            .db
            .spawn_writer(self.retry.clone(), client_id.token())
            .map_err(IndexError::from)?;
        let indexer = Arc::new(Indexer::new(client_id, writer));
        self.register_indexer(indexer.clone())?;
        Ok(indexer)
    }

    /// Remove a session, logging any work it abandons
    pub fn unregister(&self, client_id: &ClientId) -> Option<Arc<Indexer>> {
        let (_, indexer) = self.indexers.remove(client_id)?;
        match indexer.pending_work() {
            Some(pending) => warn!(
                "Session {} dropped with project {} active and {} file(s) open",
                client_id, pending.project, pending.open_files
            ),
            None => info!("Session {} unregistered", client_id),
        }
        Some(indexer)
    }

    /// Look up the session for a client id
    pub fn indexer(&self, client_id: &ClientId) -> Result<Arc<Indexer>, HostError> {
        self.indexers
            .get(client_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| HostError::UnknownClient(client_id.to_string()))
    }

    pub fn session_count(&self) -> usize {
        self.indexers.len()
    }

    /// Unregister every session idle for longer than `idle_timeout`
    pub fn reap_idle(&self, idle_timeout: Duration) -> Vec<ClientId> {
        let idle: Vec<ClientId> = self
            .indexers
            .iter()
            .filter(|entry| entry.value().idle_for() > idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for client_id in &idle {
            warn!("Session {} expired after {:?} idle", client_id, idle_timeout);
            self.unregister(client_id);
        }
        idle
    }

    /// Execute one call
    pub async fn dispatch(
        &self,
        client_id: Option<&str>,
        method: &str,
        params: Value,
        sessions: &ConnectionSessions,
    ) -> Result<Value, HostError> {
        let method = Method::from_name(method).ok_or_else(|| HostError::MethodNotFound(method.to_string()))?;

        if method == Method::Connect {
            let params: ConnectParams = parse_params(params)?;
            return self.connect(&params.language, sessions);
        }

        let client_id = ClientId::parse(client_id.ok_or(HostError::MissingClientId)?)?;
        debug!("{} from {}", method.name(), client_id);

        if method == Method::WriteLog {
            let params: WriteLogParams = parse_params(params)?;
            self.logs.write(
                client_id.language(),
                params.level,
                &params.message,
                params.exception_info.as_deref(),
            );
            return Ok(Value::Null);
        }

        let indexer = self.indexer(&client_id)?;
        match method {
            Method::Initialize => {
                let params: InitializeParams = parse_params(params)?;
                indexer.initialize(&params.styles).await?;
                Ok(Value::Null)
            }
            Method::BeginProject => {
                let params: BeginProjectParams = parse_params(params)?;
                let project_id = indexer.begin_project(&params.path).await?;
                to_result(ProjectIdResult { project_id })
            }
            Method::BeginFile => {
                let params: BeginFileParams = parse_params(params)?;
                let file_id = indexer
                    .begin_file(&params.project_id, &params.path, params.line_count, params.length)
                    .await?;
                to_result(FileIdResult { file_id })
            }
            Method::IndexToken => {
                let params: IndexTokenParams = parse_params(params)?;
                indexer.index_token(&params.file_id, params.token).await?;
                Ok(Value::Null)
            }
            Method::EndFile => {
                let params: EndFileParams = parse_params(params)?;
                indexer.end_file(&params.file_id).await?;
                Ok(Value::Null)
            }
            Method::EndProject => {
                let params: EndProjectParams = parse_params(params)?;
                indexer.end_project(&params.project_id)?;
                Ok(Value::Null)
            }
            Method::Connect | Method::WriteLog => Err(HostError::MethodNotFound(method.name().to_string())),
        }
    }

    fn connect(&self, language: &str, sessions: &ConnectionSessions) -> Result<Value, HostError> {
        if !self.config.allow_self_registration {
            return Err(HostError::SelfRegistrationDisabled);
        }
        if language.is_empty() || language.contains(':') {
            return Err(HostError::InvalidClientId(language.to_string()));
        }

        let client_id = ClientId::create(language);
        self.create_indexer(client_id.clone())?;
        sessions.lock().push(client_id.clone());
        to_result(ConnectResult {
            client_id: client_id.to_string(),
        })
    }

    /// Handle one request line. Notifications (no id) get no response.
    pub async fn handle_line(&self, line: &str, sessions: &ConnectionSessions) -> Option<RpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => return Some(RpcResponse::parse_error(format!("Parse error: {}", e))),
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        let request = match serde_json::from_value::<RpcRequest>(value) {
            Ok(request) if request.jsonrpc == JSONRPC_VERSION => request,
            Ok(request) => {
                return Some(RpcResponse::failure(
                    id,
                    codes::INVALID_REQUEST,
                    format!("Unsupported jsonrpc version '{}'", request.jsonrpc),
                ))
            }
            Err(e) => return Some(RpcResponse::failure(id, codes::INVALID_REQUEST, format!("Invalid request: {}", e))),
        };

        let result = self
            .dispatch(request.client_id.as_deref(), &request.method, request.params, sessions)
            .await;

        let response = match result {
            Ok(value) => RpcResponse::success(id, value),
            Err(e) => {
                let code = e.code();
                if code == codes::STORAGE_FAILURE || code == codes::SYMBOL_CONFLICT {
                    error!("{} failed: {}", request.method, e);
                } else {
                    warn!("{} rejected: {}", request.method, e);
                }
                RpcResponse::failure(id, code, e.to_string())
            }
        };

        request.id.map(|_| response)
    }

    /// Accept connections until `shutdown` resolves
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Host server listening on {}", listener.local_addr()?);

        let reaper = tokio::spawn(self.clone().reap_loop());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Host server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Analyzer connected from {}", peer);
                        let server = self.clone();
                        tokio::spawn(async move { server.handle_connection(stream).await });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }

        reaper.abort();
        Ok(())
    }

    async fn reap_loop(self: Arc<Self>) {
        if self.config.idle_timeout_secs == 0 {
            return;
        }
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.reap_interval_secs.max(1)));
        loop {
            interval.tick().await;
            self.reap_idle(idle_timeout);
        }
    }

    /// Serve one analyzer connection. Each line runs on its own task and
    /// responses are written back in completion order.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        let (read, mut write) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();

        let writer = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut line = match serde_json::to_string(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to serialize response: {}", e);
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = write.write_all(line.as_bytes()).await {
                    debug!("Connection write failed: {}", e);
                    break;
                }
            }
        });

        let sessions: Arc<ConnectionSessions> = Arc::new(Mutex::new(Vec::new()));
        let mut lines = BufReader::new(read).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let server = self.clone();
                    let tx = tx.clone();
                    let sessions = sessions.clone();
                    tokio::spawn(async move {
                        if let Some(response) = server.handle_line(&line, &sessions).await {
                            let _ = tx.send(response);
                        }
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from {:?}: {}", peer, e);
                    break;
                }
            }
        }
        drop(tx);

        let owned = std::mem::take(&mut *sessions.lock());
        for client_id in &owned {
            self.unregister(client_id);
        }

        let _ = writer.await;
        debug!("Analyzer connection {:?} closed", peer);
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HostError> {
    Ok(serde_json::from_value(params)?)
}

fn to_result<T: Serialize>(result: T) -> Result<Value, HostError> {
    serde_json::to_value(result).map_err(|e| HostError::Internal(e.to_string()))
}
