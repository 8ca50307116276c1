//! The central Model Context Protocol engine
//!
//! Decodes JSON-RPC payloads, negotiates capabilities (`initialize`), and
//! routes `tools/*` methods into whichever `ToolRegistry` the transport
//! adapter serves.

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, CallToolResult, ContentBlock, Implementation,
    InitializeRequest, InitializeResult, JsonrpcMessage, JsonrpcRequest, ListToolsRequest,
    ListToolsResult, PingRequest, ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools,
    TextContent,
};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::errors::AppError;
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_error_with_data,
    json_rpc_result, request_id_to_value,
};
use crate::registry::ToolRegistry;

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

pub async fn handle_json_rpc_value(registry: &ToolRegistry, payload: Value) -> Option<Value> {
    if !payload.is_object() {
        return Some(json_rpc_error(None, -32600, "Invalid Request"));
    }

    let request_id = payload.get("id").cloned();
    let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => return Some(json_rpc_error(request_id, -32600, "Invalid Request")),
    };

    match parsed {
        JsonrpcMessage::Request(request) => {
            if let Err(error_response) = validate_request_shape(&request) {
                return Some(error_response);
            }

            let request_id = request_id_to_value(request.id);
            if request.method.trim().is_empty() {
                return Some(json_rpc_error(Some(request_id), -32600, "Invalid Request"));
            }

            Some(
                handle_json_rpc_request(
                    registry,
                    Some(request_id),
                    request.method,
                    request.params.map(Value::Object),
                )
                .await,
            )
        }
        JsonrpcMessage::Notification(notification) => {
            if notification.method.trim().is_empty() {
                return None;
            }

            let _ = handle_json_rpc_request(
                registry,
                None,
                notification.method,
                notification.params.map(Value::Object),
            )
            .await;
            None
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
            Some(json_rpc_error(request_id, -32600, "Invalid Request"))
        }
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let payload = serde_json::to_value(request).expect("jsonrpc request serialization");
    let request_id = Some(request_id_to_value(request.id.clone()));

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, -32602, "Invalid params"))
    }
}

pub async fn handle_json_rpc_request(
    registry: &ToolRegistry,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
) -> Value {
    let audit_params = redact_audit_params(params.as_ref());

    let response = match method.as_str() {
        "initialize" => {
            let protocol_version = match negotiate_protocol_version(params.as_ref()) {
                Ok(version) => version,
                Err(err) => return app_error_to_json_rpc(id, err),
            };

            let initialize_result = InitializeResult {
                server_info: Implementation {
                    name: registry.server_name().to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: None,
                    description: None,
                    icons: vec![],
                    website_url: None,
                },
                capabilities: ServerCapabilities {
                    tools: Some(ServerCapabilitiesTools {
                        list_changed: Some(false),
                    }),
                    resources: None,
                    prompts: None,
                    ..Default::default()
                },
                protocol_version: protocol_version.into(),
                instructions: None,
                meta: None,
            };

            json_rpc_result(
                id,
                serde_json::to_value(initialize_result).expect("initialize result serialization"),
            )
        }
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => json_rpc_result(
            id,
            serde_json::to_value(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: registry.definitions(),
            })
            .expect("tools list result serialization"),
        ),
        "tools/call" => handle_tools_call(registry, id, params).await,
        _ => json_rpc_error(id, -32601, "Method not found"),
    };

    info!(
        server = registry.server_name(),
        method = %method,
        params = %audit_params,
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp action audited"
    );

    response
}

pub async fn handle_tools_call(
    registry: &ToolRegistry,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    let arguments = Value::Object(tool_call.arguments.unwrap_or_default());
    match registry.invoke(&tool_call.name, arguments).await {
        Some(Ok(value)) => json_rpc_result(id, call_tool_result(value)),
        Some(Err(err)) => app_error_to_json_rpc(id, err),
        None => json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}

/// Wraps a handler's structured value as an MCP tool result. Object payloads
/// land in `structuredContent` verbatim; anything else is wrapped under a
/// `result` key so the field stays an object.
fn call_tool_result(value: Value) -> Value {
    let structured_content = match &value {
        Value::Object(map) => map.clone(),
        other => Map::from_iter([("result".to_string(), other.clone())]),
    };

    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());

    serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(structured_content),
    })
    .expect("tool result serialization")
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(AppError::bad_request(
            "unsupported_protocol_version",
            "unsupported initialize protocolVersion",
        ));
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::registry::ToolRegistry;

    use super::{
        handle_json_rpc_value, negotiate_protocol_version, redact_audit_params,
        SUPPORTED_PROTOCOL_VERSION,
    };

    use rust_mcp_sdk::macros;
    use serde::{Deserialize, Serialize};

    #[macros::mcp_tool(name = "reverse", description = "Reverses a string")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    struct ReverseTool {
        pub value: String,
    }

    fn test_registry() -> ToolRegistry {
        ToolRegistry::builder("test-server")
            .register(ReverseTool::tool(), |arguments| async move {
                let params: ReverseTool = serde_json::from_value(arguments).map_err(|_| {
                    crate::errors::AppError::bad_request("invalid_arguments", "value is required")
                })?;
                Ok(json!({
                    "status": "success",
                    "output": params.value.chars().rev().collect::<String>(),
                }))
            })
            .expect("registration")
            .build()
    }

    #[tokio::test]
    async fn tools_call_wraps_structured_content() {
        let registry = test_registry();
        let response = handle_json_rpc_value(
            &registry,
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"name": "reverse", "arguments": {"value": "abc"}}
            }),
        )
        .await
        .expect("response for request");

        assert_eq!(response["id"], 5);
        assert_eq!(response["result"]["structuredContent"]["output"], "cba");
        assert!(response["result"]["content"].is_array());
    }

    #[tokio::test]
    async fn unknown_tool_reports_tool_not_found() {
        let registry = test_registry();
        let response = handle_json_rpc_value(
            &registry,
            json!({
                "jsonrpc": "2.0",
                "id": 6,
                "method": "tools/call",
                "params": {"name": "unknown_tool", "arguments": {}}
            }),
        )
        .await
        .expect("response for request");

        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["data"]["code"], "tool_not_found");
    }

    #[tokio::test]
    async fn malformed_arguments_report_invalid_params() {
        let registry = test_registry();
        let response = handle_json_rpc_value(
            &registry,
            json!({
                "jsonrpc": "2.0",
                "id": 8,
                "method": "tools/call",
                "params": {"name": "reverse", "arguments": {}}
            }),
        )
        .await
        .expect("response for request");

        assert_eq!(response["error"]["code"], -32602);
        assert_eq!(response["error"]["data"]["code"], "invalid_arguments");
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let registry = test_registry();
        let response =
            handle_json_rpc_value(&registry, json!({"jsonrpc": "2.0", "method": "ping"})).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn initialize_reports_registry_server_name() {
        let registry = test_registry();
        let response = handle_json_rpc_value(
            &registry,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": SUPPORTED_PROTOCOL_VERSION,
                    "clientInfo": {"name": "test-client", "version": "1.0.0"},
                    "capabilities": {}
                }
            }),
        )
        .await
        .expect("response for request");

        assert_eq!(response["result"]["serverInfo"]["name"], "test-server");
        assert_eq!(
            response["result"]["protocolVersion"],
            SUPPORTED_PROTOCOL_VERSION
        );
        assert!(response["result"]["capabilities"]["tools"].is_object());
        assert!(response["result"]["capabilities"]["resources"].is_null());
    }

    #[test]
    fn negotiate_protocol_version_rejects_unsupported_version() {
        let params = json!({
            "protocolVersion": "2026-01-01"
        });

        let error =
            negotiate_protocol_version(Some(&params)).expect_err("unsupported version must fail");
        assert!(error.to_string().contains("bad request"));
    }

    #[test]
    fn redacts_sensitive_fields_in_audit_params() {
        let params = json!({
            "name": "stop_container",
            "arguments": {
                "container_id": "aaaa11112222",
                "registry_token": "should-not-appear",
                "nested": {
                    "secret": "should-not-appear"
                }
            }
        });

        let redacted = redact_audit_params(Some(&params));

        assert_eq!(redacted["arguments"]["container_id"], json!("aaaa11112222"));
        assert_eq!(redacted["arguments"]["registry_token"], json!("[REDACTED]"));
        assert_eq!(
            redacted["arguments"]["nested"]["secret"],
            json!("[REDACTED]")
        );
    }
}
