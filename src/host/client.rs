// Analyzer-side client for the host protocol

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::error::ClientError;
use crate::host::client_id::ClientId;
use crate::host::logs::AnalyzerLogLevel;
use crate::host::protocol::{
    BeginFileParams, BeginProjectParams, ConnectParams, ConnectResult, EndFileParams, EndProjectParams,
    FileIdResult, IndexTokenParams, InitializeParams, Method, ProjectIdResult, RpcRequest, RpcResponse,
    WriteLogParams, JSONRPC_VERSION,
};
use crate::session::{StyleDefinition, Token};

/// One analyzer connection. Calls are issued one at a time, so the host sees
/// them in the order they are made.
pub struct HostClient {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    client_id: Option<ClientId>,
    next_id: u64,
}

impl HostClient {
    /// Connect using an identity already registered with the host
    pub async fn connect<A: ToSocketAddrs>(addr: A, client_id: ClientId) -> Result<Self, ClientError> {
        let mut client = Self::open(addr).await?;
        client.client_id = Some(client_id);
        Ok(client)
    }

    /// Connect and ask the host to create a session for `language`
    pub async fn connect_new<A: ToSocketAddrs>(addr: A, language: &str) -> Result<Self, ClientError> {
        let mut client = Self::open(addr).await?;
        let result: ConnectResult = client
            .call(
                Method::Connect,
                ConnectParams {
                    language: language.to_string(),
                },
            )
            .await?;
        let client_id = ClientId::parse(&result.client_id).map_err(|e| ClientError::Rpc {
            code: e.code(),
            message: e.to_string(),
        })?;
        debug!("Connected as {}", client_id);
        client.client_id = Some(client_id);
        Ok(client)
    }

    async fn open<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (read, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read).lines(),
            writer,
            client_id: None,
            next_id: 1,
        })
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    async fn call<P: Serialize, R: DeserializeOwned>(&mut self, method: Method, params: P) -> Result<R, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: method.name().to_string(),
            client_id: self.client_id.as_ref().map(ToString::to_string),
            params: serde_json::to_value(params)?,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        loop {
            let line = self.reader.next_line().await?.ok_or(ClientError::ConnectionClosed)?;
            let response: RpcResponse = serde_json::from_str(&line)?;
            if response.id != Value::from(id) {
                debug!("Skipping response for request {}", response.id);
                continue;
            }
            if let Some(error) = response.error {
                return Err(ClientError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?);
        }
    }

    pub async fn initialize(&mut self, styles: BTreeMap<String, StyleDefinition>) -> Result<(), ClientError> {
        self.call(Method::Initialize, InitializeParams { styles }).await
    }

    pub async fn begin_project(&mut self, path: &str) -> Result<String, ClientError> {
        let result: ProjectIdResult = self
            .call(Method::BeginProject, BeginProjectParams { path: path.to_string() })
            .await?;
        Ok(result.project_id)
    }

    pub async fn begin_file(&mut self, project_id: &str, path: &str, line_count: u32, length: u64) -> Result<String, ClientError> {
        let result: FileIdResult = self
            .call(
                Method::BeginFile,
                BeginFileParams {
                    project_id: project_id.to_string(),
                    path: path.to_string(),
                    line_count,
                    length,
                },
            )
            .await?;
        Ok(result.file_id)
    }

    pub async fn index_token(&mut self, file_id: &str, token: Token) -> Result<(), ClientError> {
        self.call(
            Method::IndexToken,
            IndexTokenParams {
                file_id: file_id.to_string(),
                token,
            },
        )
        .await
    }

    pub async fn end_file(&mut self, file_id: &str) -> Result<(), ClientError> {
        self.call(Method::EndFile, EndFileParams { file_id: file_id.to_string() }).await
    }

    pub async fn end_project(&mut self, project_id: &str) -> Result<(), ClientError> {
        self.call(
            Method::EndProject,
            EndProjectParams {
                project_id: project_id.to_string(),
            },
        )
        .await
    }

    pub async fn write_log(
        &mut self,
        level: AnalyzerLogLevel,
        message: &str,
        exception_info: Option<&str>,
    ) -> Result<(), ClientError> {
        self.call(
            Method::WriteLog,
            WriteLogParams {
                level,
                message: message.to_string(),
                exception_info: exception_info.map(String::from),
            },
        )
        .await
    }
}
