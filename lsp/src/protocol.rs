//! JSON-RPC message shapes for the lifecycle subset of the protocol.
//!
//! Only what connecting and disconnecting need: `initialize`, `initialized`,
//! `shutdown`, `exit`, plus enough of the server-to-client traffic to keep
//! the server from blocking on us.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// JSON-RPC "method not found".
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// A message read from the server, classified by shape.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response {
        id: u64,
        body: serde_json::Value,
    },
    ServerRequest {
        id: serde_json::Value,
        method: String,
        params: Option<serde_json::Value>,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

impl Incoming {
    pub fn classify(frame: &serde_json::Value) -> Option<Self> {
        let id = frame.get("id");
        let method = frame.get("method").and_then(|m| m.as_str());
        let is_response = frame.get("result").is_some() || frame.get("error").is_some();

        match (id, method) {
            (Some(id), None) if is_response => Some(Self::Response {
                id: id.as_u64()?,
                body: frame.clone(),
            }),
            (Some(id), Some(method)) => Some(Self::ServerRequest {
                id: id.clone(),
                method: method.to_string(),
                params: frame.get("params").cloned(),
            }),
            (None, Some(method)) => Some(Self::Notification {
                method: method.to_string(),
                params: frame.get("params").cloned(),
            }),
            _ => None,
        }
    }
}

/// Reply to a server-initiated request.
///
/// Registration and configuration requests get benign answers; everything
/// else is method-not-found so the server never waits on us.
pub(crate) fn reply_to_server_request(
    id: &serde_json::Value,
    method: &str,
    params: Option<&serde_json::Value>,
) -> serde_json::Value {
    match method {
        "client/registerCapability" | "client/unregisterCapability" => {
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": null })
        }
        "workspace/configuration" => {
            let items = params
                .and_then(|p| p.get("items"))
                .and_then(|i| i.as_array())
                .map_or(0, Vec::len);
            let result = vec![serde_json::Value::Null; items];
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
        }
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": METHOD_NOT_FOUND,
                "message": format!("Method not found: {method}")
            }
        }),
    }
}

/// Extract the error message from a response, if it carries one.
pub(crate) fn response_error(body: &serde_json::Value) -> Option<String> {
    let error = body.get("error")?;
    Some(
        error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string(),
    )
}

pub(crate) fn initialize_params(root: &Path, folders: &[PathBuf]) -> serde_json::Value {
    let root_uri = path_to_file_uri(root);
    let workspace_folders: Vec<serde_json::Value> = folders
        .iter()
        .filter_map(|folder| {
            let uri = path_to_file_uri(folder)?;
            let name = folder
                .file_name()
                .map_or_else(|| uri.clone(), |n| n.to_string_lossy().into_owned());
            Some(serde_json::json!({ "uri": uri, "name": name }))
        })
        .collect();

    serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": "fmtlink",
            "version": env!("CARGO_PKG_VERSION")
        },
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "formatting": { "dynamicRegistration": false },
                "rangeFormatting": { "dynamicRegistration": false }
            },
            "workspace": {
                "workspaceFolders": true,
                "configuration": true
            }
        },
        "workspaceFolders": workspace_folders
    })
}

pub(crate) fn path_to_file_uri(path: &Path) -> Option<String> {
    url::Url::from_file_path(path).ok().map(String::from)
}

/// `window/logMessage` severity (1=Error .. 4=Log) as a label.
pub(crate) fn log_message_level(params: &serde_json::Value) -> &'static str {
    match params.get("type").and_then(serde_json::Value::as_u64) {
        Some(1) => "error",
        Some(2) => "warning",
        Some(3) => "info",
        _ => "log",
    }
}
