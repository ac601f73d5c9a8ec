//! Tool catalog adapter. Turns raw `tools/list` and `tools/call` payloads
//! into server-qualified descriptors and flat call results.

use crate::error::McpError;
use serde::{Deserialize, Serialize};

/// Separator between the server name and the tool name in a qualified name.
pub const QUALIFIED_NAME_DELIMITER: &str = "__";

/// Mime type assumed for image content that does not declare one.
pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Build the qualified name `<server>__<tool>`.
pub fn qualify(server_name: &str, tool_name: &str) -> String {
    format!("{server_name}{QUALIFIED_NAME_DELIMITER}{tool_name}")
}

/// Split a qualified name on the first delimiter into `(server, tool)`.
pub fn split_qualified(qualified_name: &str) -> Option<(&str, &str)> {
    qualified_name.split_once(QUALIFIED_NAME_DELIMITER)
}

/// A tool exposed by one MCP server, named so it is unique across servers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    #[serde(rename = "name")]
    pub qualified_name: String,
    #[serde(rename = "originalName")]
    pub original_name: String,
    #[serde(rename = "server")]
    pub owner_server: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
    /// Any other fields the provider sent (`title`, `annotations`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolDescriptor {
    fn from_entry(server_name: &str, mut entry: ToolEntry) -> Self {
        // These keys are owned by the descriptor itself.
        entry.extra.remove("originalName");
        entry.extra.remove("server");
        Self {
            qualified_name: qualify(server_name, &entry.name),
            original_name: entry.name,
            owner_server: server_name.to_string(),
            description: entry.description.unwrap_or_default(),
            input_schema: entry.input_schema,
            extra: entry.extra,
        }
    }
}

/// Raw shape of a `tools/list` result.
#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Parse a `tools/list` result into descriptors owned by `server_name`.
pub fn parse_tool_list(
    server_name: &str,
    result: serde_json::Value,
) -> Result<Vec<ToolDescriptor>, McpError> {
    let list: ToolsListResult =
        serde_json::from_value(result).map_err(|e| McpError::ProtocolDecode {
            server: server_name.to_string(),
            reason: format!("invalid tools/list result: {e}"),
        })?;
    Ok(list
        .tools
        .into_iter()
        .map(|entry| ToolDescriptor::from_entry(server_name, entry))
        .collect())
}

/// A content item in a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        #[serde(default)]
        text: String,
    },
    Image {
        #[serde(default)]
        data: String,
        #[serde(default = "default_mime_type", rename = "mimeType")]
        mime_type: String,
    },
    /// Resources, audio and anything newer than this client.
    #[serde(other)]
    Other,
}

fn default_mime_type() -> String {
    DEFAULT_IMAGE_MIME_TYPE.to_string()
}

/// A base64 image returned by a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageContent {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Flattened result of calling a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallResult {
    #[serde(rename = "result", skip_serializing_if = "Option::is_none")]
    pub result_text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl CallResult {
    /// An error result carrying only a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            result_text: Some(message.into()),
            images: Vec::new(),
            is_error: true,
        }
    }

    /// Flatten a successful `tools/call` result.
    ///
    /// Text items are joined with newlines. When there is no text at all the
    /// serialized raw result is returned instead.
    pub fn from_tool_result(result: &serde_json::Value) -> Self {
        let is_error = result
            .get("isError")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let content: Vec<ToolContent> = result
            .get("content")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut texts = Vec::new();
        let mut images = Vec::new();
        for item in content {
            match item {
                ToolContent::Text { text } => texts.push(text),
                ToolContent::Image { data, mime_type } => {
                    images.push(ImageContent { data, mime_type });
                }
                ToolContent::Other => {}
            }
        }

        let result_text = if texts.is_empty() {
            result.to_string()
        } else {
            texts.join("\n")
        };

        Self {
            result_text: Some(result_text),
            images,
            is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qualified_name_format() {
        assert_eq!(qualify("filesystem", "read_file"), "filesystem__read_file");
    }

    #[test]
    fn split_uses_first_delimiter() {
        assert_eq!(split_qualified("fs__read_file"), Some(("fs", "read_file")));
        assert_eq!(split_qualified("a__b__c"), Some(("a", "b__c")));
        assert_eq!(split_qualified("nodelimiter"), None);
        assert_eq!(split_qualified("single_underscore"), None);
    }

    #[test]
    fn tool_list_entries_are_qualified() {
        let result = json!({
            "tools": [
                {"name": "read_file", "description": "Read a file", "inputSchema": {"type": "object", "required": ["path"]}},
                {"name": "list"}
            ]
        });
        let tools = parse_tool_list("fs", result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].qualified_name, "fs__read_file");
        assert_eq!(tools[0].original_name, "read_file");
        assert_eq!(tools[0].owner_server, "fs");
        assert_eq!(tools[0].description, "Read a file");
        assert_eq!(tools[0].input_schema["required"][0], "path");
        assert!(tools[1].description.is_empty());
        assert_eq!(tools[1].input_schema["type"], "object");
    }

    #[test]
    fn tool_list_without_tools_key_is_empty() {
        assert!(parse_tool_list("fs", json!({})).unwrap().is_empty());
    }

    #[test]
    fn malformed_tool_list_is_a_decode_error() {
        let err = parse_tool_list("fs", json!({"tools": [{"description": "no name"}]}));
        assert!(matches!(err, Err(McpError::ProtocolDecode { .. })));
    }

    #[test]
    fn descriptor_serializes_for_frontends() {
        let tools = parse_tool_list("fs", json!({"tools": [{"name": "read_file"}]})).unwrap();
        let value = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(value["name"], "fs__read_file");
        assert_eq!(value["originalName"], "read_file");
        assert_eq!(value["server"], "fs");
        assert!(value["inputSchema"].is_object());
    }

    #[test]
    fn provider_metadata_is_passed_through() {
        let result = json!({
            "tools": [{
                "name": "delete_file",
                "title": "Delete file",
                "annotations": {"destructiveHint": true},
                "outputSchema": {"type": "object"},
                "server": "spoofed"
            }]
        });
        let tools = parse_tool_list("fs", result).unwrap();
        assert_eq!(tools[0].extra["title"], "Delete file");
        assert!(!tools[0].extra.contains_key("name"));

        let value = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(value["name"], "fs__delete_file");
        assert_eq!(value["server"], "fs");
        assert_eq!(value["annotations"]["destructiveHint"], true);
        assert_eq!(value["outputSchema"]["type"], "object");
    }

    #[test]
    fn single_text_item() {
        let result = CallResult::from_tool_result(&json!({
            "content": [{"type": "text", "text": "hello"}]
        }));
        assert_eq!(result.result_text.as_deref(), Some("hello"));
        assert!(result.images.is_empty());
        assert!(!result.is_error);
    }

    #[test]
    fn text_items_are_joined_with_newlines() {
        let result = CallResult::from_tool_result(&json!({
            "content": [
                {"type": "text", "text": "one"},
                {"type": "resource", "resource": {"uri": "file:///a"}},
                {"type": "text", "text": "two"}
            ],
            "isError": false
        }));
        assert_eq!(result.result_text.as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn images_are_collected_with_default_mime_type() {
        let result = CallResult::from_tool_result(&json!({
            "content": [
                {"type": "image", "data": "aGVsbG8=", "mimeType": "image/jpeg"},
                {"type": "image", "data": "d29ybGQ="},
                {"type": "text", "text": "two screenshots"}
            ]
        }));
        assert_eq!(result.images.len(), 2);
        assert_eq!(result.images[0].mime_type, "image/jpeg");
        assert_eq!(result.images[1].mime_type, DEFAULT_IMAGE_MIME_TYPE);
        assert_eq!(result.result_text.as_deref(), Some("two screenshots"));
    }

    #[test]
    fn no_text_falls_back_to_raw_result() {
        let raw = json!({"content": [{"type": "image", "data": "eA=="}]});
        let result = CallResult::from_tool_result(&raw);
        let text = result.result_text.unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, raw);
        assert_eq!(result.images.len(), 1);
    }

    #[test]
    fn malformed_content_falls_back_to_raw_result() {
        let raw = json!({"content": "not a list", "isError": true});
        let result = CallResult::from_tool_result(&raw);
        assert!(result.is_error);
        assert!(result.result_text.unwrap().contains("not a list"));
    }

    #[test]
    fn error_flag_is_copied() {
        let result = CallResult::from_tool_result(&json!({
            "content": [{"type": "text", "text": "not found"}],
            "isError": true
        }));
        assert!(result.is_error);
        assert_eq!(result.result_text.as_deref(), Some("not found"));
    }

    #[test]
    fn call_result_serializes_for_frontends() {
        let value = serde_json::to_value(CallResult::error("boom")).unwrap();
        assert_eq!(value["result"], "boom");
        assert_eq!(value["isError"], true);
        assert!(value.get("images").is_none());
    }
}
