//! Error types for the index store, the session protocol and the RPC host.

use rusqlite::ffi;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::index::symbol::SymbolKey;

/// Errors raised by the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Two different normalized names hashed to the same symbol key.
    #[error("Symbol {key} is recorded as '{stored}' but was indexed as '{incoming}'")]
    SymbolCollision {
        key: SymbolKey,
        stored: String,
        incoming: String,
    },

    #[error("Giving up after {attempts} conflicting commit attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },

    #[error("Store writer is no longer running")]
    WriterClosed,
}

impl StoreError {
    /// Whether the error is a transient conflict with another writer.
    ///
    /// Busy and locked results cover both lock contention and stale-snapshot
    /// upgrades in WAL mode. Unique-key violations happen when a concurrent
    /// writer inserted the same folder or symbol between our read and our write.
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => match err.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => true,
                ErrorCode::ConstraintViolation => matches!(
                    err.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ),
                _ => false,
            },
            _ => false,
        }
    }
}

/// Errors raised by an indexing session
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Initialize must be called first")]
    NotInitialized,

    #[error("Initialize has already been called for this session")]
    AlreadyInitialized,

    #[error("BeginProject cannot be called before ending the previous project")]
    ProjectAlreadyActive,

    #[error("No project is active")]
    NoActiveProject,

    #[error("The active project is still being created")]
    ProjectPending,

    #[error("Invalid project id '{0}'")]
    InvalidProjectId(String),

    #[error("File '{0}' already started")]
    FileAlreadyOpen(String),

    #[error("File '{0}' is not open")]
    UnknownFile(String),

    #[error("EndProject cannot be called while {0} file(s) are still open")]
    FilesPending(usize),

    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IndexError {
    /// Whether the call was made in the wrong session state.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, IndexError::Store(_))
    }
}

/// Errors raised by the RPC front door
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Request carries no client id")]
    MissingClientId,

    #[error("The string '{0}' is not a valid client id")]
    InvalidClientId(String),

    #[error("ClientId {0} not recognized")]
    UnknownClient(String),

    #[error("Indexer for client id {0} already exists")]
    DuplicateClient(String),

    #[error("Self registration is disabled on this server")]
    SelfRegistrationDisabled,

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const PROTOCOL_VIOLATION: i32 = -32000;
    pub const UNKNOWN_CLIENT: i32 = -32001;
    pub const DUPLICATE_CLIENT: i32 = -32002;
    pub const INVALID_CLIENT_ID: i32 = -32003;
    pub const SYMBOL_CONFLICT: i32 = -32004;
    pub const STORAGE_FAILURE: i32 = -32005;
}

impl HostError {
    /// JSON-RPC error code reported to the analyzer
    pub fn code(&self) -> i32 {
        match self {
            HostError::MissingClientId | HostError::InvalidClientId(_) => codes::INVALID_CLIENT_ID,
            HostError::UnknownClient(_) | HostError::SelfRegistrationDisabled => codes::UNKNOWN_CLIENT,
            HostError::DuplicateClient(_) => codes::DUPLICATE_CLIENT,
            HostError::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            HostError::InvalidParams(_) => codes::INVALID_PARAMS,
            HostError::Internal(_) => codes::INTERNAL_ERROR,
            HostError::Index(IndexError::Store(StoreError::SymbolCollision { .. })) => codes::SYMBOL_CONFLICT,
            HostError::Index(IndexError::Store(_)) => codes::STORAGE_FAILURE,
            HostError::Index(_) => codes::PROTOCOL_VIOLATION,
        }
    }
}

/// Errors seen by an analyzer talking to the host
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Connection closed by host")]
    ConnectionClosed,
}
