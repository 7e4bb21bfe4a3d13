//! Wire format between analyzers and the host.
//!
//! Newline-delimited JSON-RPC 2.0. Every request names the calling session in
//! a top-level `clientId` member; parameter and result members are camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::codes;
use crate::host::logs::AnalyzerLogLevel;
use crate::session::{StyleDefinition, Token};

pub const JSONRPC_VERSION: &str = "2.0";

/// Methods understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Connect,
    Initialize,
    BeginProject,
    BeginFile,
    IndexToken,
    EndFile,
    EndProject,
    WriteLog,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Method::Connect),
            "initialize" => Some(Method::Initialize),
            "beginProject" => Some(Method::BeginProject),
            "beginFile" => Some(Method::BeginFile),
            "indexToken" => Some(Method::IndexToken),
            "endFile" => Some(Method::EndFile),
            "endProject" => Some(Method::EndProject),
            "writeLog" => Some(Method::WriteLog),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Method::Connect => "connect",
            Method::Initialize => "initialize",
            Method::BeginProject => "beginProject",
            Method::BeginFile => "beginFile",
            Method::IndexToken => "indexToken",
            Method::EndFile => "endFile",
            Method::EndProject => "endProject",
            Method::WriteLog => "writeLog",
        }
    }
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::failure(Value::Null, codes::PARSE_ERROR, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub client_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeParams {
    #[serde(default)]
    pub styles: BTreeMap<String, StyleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginProjectParams {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdResult {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginFileParams {
    pub project_id: String,
    pub path: String,
    pub line_count: u32,
    pub length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdResult {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexTokenParams {
    pub file_id: String,
    #[serde(flatten)]
    pub token: Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndFileParams {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndProjectParams {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteLogParams {
    pub level: AnalyzerLogLevel,
    pub message: String,
    #[serde(default)]
    pub exception_info: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ReferenceKind;
    use serde_json::json;

    #[test]
    fn test_method_names() {
        for method in [
            Method::Connect,
            Method::Initialize,
            Method::BeginProject,
            Method::BeginFile,
            Method::IndexToken,
            Method::EndFile,
            Method::EndProject,
            Method::WriteLog,
        ] {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("begin_project"), None);
    }

    #[test]
    fn test_request_with_client_id() {
        let request: RpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "beginProject",
            "clientId": "csharp:abc",
            "params": {"path": "src/test"}
        }))
        .unwrap();
        assert_eq!(request.client_id.as_deref(), Some("csharp:abc"));
        let params: BeginProjectParams = serde_json::from_value(request.params).unwrap();
        assert_eq!(params.path, "src/test");
    }

    #[test]
    fn test_index_token_params() {
        let params: IndexTokenParams = serde_json::from_value(json!({
            "fileId": "foo.cs",
            "classification": "i",
            "text": "Foo",
            "declaredSymbol": {"name": "T:Foo", "kind": "class"},
            "referenceKind": "implementation",
            "implementedSymbols": [{"name": "T:IFoo"}]
        }))
        .unwrap();
        assert_eq!(params.file_id, "foo.cs");
        assert_eq!(params.token.declared_symbol.unwrap().kind.as_deref(), Some("class"));
        assert_eq!(params.token.referenced_symbol, None);
        assert_eq!(params.token.reference_kind, Some(ReferenceKind::Implementation));
        assert_eq!(params.token.implemented_symbols[0].kind, None);
    }

    #[test]
    fn test_initialize_params() {
        let params: InitializeParams = serde_json::from_value(json!({
            "styles": {"kw": {"color": "blue", "backgroundColor": "white", "fontWeight": "bold"}}
        }))
        .unwrap();
        let kw = &params.styles["kw"];
        assert_eq!(kw.background_color.as_deref(), Some("white"));
        assert_eq!(kw.font_weight.as_deref(), Some("bold"));
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(RpcResponse::success(json!(1), Value::Null)).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": null}));

        let err = serde_json::to_value(RpcResponse::failure(json!(2), codes::UNKNOWN_CLIENT, "nope")).unwrap();
        assert_eq!(err["error"]["code"], json!(-32001));
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_write_log_level_must_be_known() {
        let params: WriteLogParams = serde_json::from_value(json!({"level": 3, "message": "m"})).unwrap();
        assert_eq!(params.level, AnalyzerLogLevel::Warning);
        assert!(serde_json::from_value::<WriteLogParams>(json!({"level": 9, "message": "m"})).is_err());
    }
}
