//! JSON-RPC 2.0 types for MCP communication.

use serde::{Deserialize, Serialize};

/// Error code of the synthetic response returned when a request times out.
pub const TIMEOUT_ERROR_CODE: i64 = -1;

/// Error code of the synthetic response returned when a pending request is
/// released because the server's output stream closed.
pub const CONNECTION_CLOSED_ERROR_CODE: i64 = -32000;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response, as handed back to the caller of a request.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcResponse {
    pub id: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a response that carries only an error, with no id.
    ///
    /// Used for timeouts and dropped connections so callers see one shape for
    /// every kind of failure.
    pub fn synthetic_error(code: i64, message: impl Into<String>) -> Self {
        Self {
            id: None,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Any message read from a server's stdout: a response, a notification, or a
/// server-initiated request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcMessage {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcMessage {
    /// The id as a correlation key. Numeric ids are rendered as strings.
    pub fn correlation_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether this is a notification (has a method, no id).
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// Convert into the response handed to a waiting request.
    pub fn into_response(self) -> JsonRpcResponse {
        let id = self.correlation_id();
        JsonRpcResponse {
            id,
            result: self.result,
            error: self.error,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_with_params() {
        let req = JsonRpcRequest::new(
            "req-1",
            "tools/call",
            Some(serde_json::json!({"name": "read", "arguments": {}})),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], "req-1");
        assert_eq!(json["method"], "tools/call");
        assert!(json["params"].is_object());
    }

    #[test]
    fn serialized_request_is_a_single_line() {
        let req = JsonRpcRequest::new(
            "abc",
            "tools/call",
            Some(serde_json::json!({"text": "line one\nline two"})),
        );
        let line = serde_json::to_string(&req).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn deserialize_message_with_result() {
        let json = r#"{"jsonrpc":"2.0","id":"a1","result":{"tools":[]}}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.correlation_id().as_deref(), Some("a1"));
        assert!(!msg.is_notification());
        let resp = msg.into_response();
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());
    }

    #[test]
    fn deserialize_message_with_error() {
        let json =
            r#"{"jsonrpc":"2.0","id":"a1","error":{"code":-32601,"message":"Method not found"}}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        let err = msg.into_response().error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "Method not found");
        assert!(err.data.is_none());
    }

    #[test]
    fn numeric_ids_become_string_keys() {
        let json = r#"{"jsonrpc":"2.0","id":7,"result":{}}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.correlation_id().as_deref(), Some("7"));
    }

    #[test]
    fn notification_has_method_and_no_id() {
        let json = r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_notification());
        assert!(msg.correlation_id().is_none());
    }

    #[test]
    fn error_object_without_message_still_parses() {
        let json = r#"{"jsonrpc":"2.0","id":"x","error":{"code":5}}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        let err = msg.error.unwrap();
        assert_eq!(err.code, 5);
        assert!(err.message.is_empty());
    }

    #[test]
    fn synthetic_error_has_no_id() {
        let resp = JsonRpcResponse::synthetic_error(TIMEOUT_ERROR_CODE, "Request timeout after 1s");
        assert!(resp.id.is_none());
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, -1);
        assert_eq!(err.message, "Request timeout after 1s");
    }

    #[test]
    fn serialize_notification_without_params() {
        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_none());
    }
}
