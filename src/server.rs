//! MCP server exposing the routing tools over stdio.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::protocol::{
    error_codes, McpRequest, McpResponse, ServerCapabilities, ServerInfo, ToolCapabilities,
    PROTOCOL_VERSION,
};
use crate::tools::{ToolContext, ToolRegistry};

/// Scratchpad MCP server.
pub struct ScratchpadServer {
    registry: ToolRegistry,
    server_info: ServerInfo,
    /// Set once the client confirms initialization.
    initialized: bool,
}

impl ScratchpadServer {
    /// Create a new MCP server.
    pub fn new(context: ToolContext) -> Self {
        let server_info = ServerInfo::from(context.config.server.clone());
        Self {
            registry: ToolRegistry::new(context),
            server_info,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio.
    pub async fn run_stdio(&mut self) -> Result<()> {
        info!(
            name = %self.server_info.name,
            version = %self.server_info.version,
            "starting MCP server on stdio"
        );
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Read newline-delimited requests from `reader` and answer on `writer`
    /// until the input closes.
    pub async fn serve<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            debug!("received: {}", line);

            let Some(response) = self.handle_message(line).await else {
                continue;
            };
            let response_json = serde_json::to_string(&response)?;

            debug!("sending: {}", response_json);

            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle a single message. Notifications produce no response.
    pub async fn handle_message(&mut self, message: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                error!("failed to parse request: {}", e);
                return Some(McpResponse::error(
                    Some(Value::Null),
                    error_codes::PARSE_ERROR,
                    e.to_string(),
                ));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&request),
            "tools/list" => self.handle_tools_list(&request),
            "tools/call" => self.handle_tools_call(&request).await,
            "ping" => McpResponse::success(request.id.clone(), json!({})),
            _ => McpResponse::error(
                request.id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("unknown method: {}", request.method),
            ),
        };
        Some(response)
    }

    fn handle_notification(&mut self, request: &McpRequest) {
        match request.method.as_str() {
            "notifications/initialized" | "initialized" => {
                self.initialized = true;
                info!("MCP client initialized");
            }
            other => debug!(method = other, "ignoring notification"),
        }
    }

    fn handle_initialize(&self, request: &McpRequest) -> McpResponse {
        info!("initializing MCP server");

        let capabilities = ServerCapabilities {
            tools: Some(ToolCapabilities { list_changed: false }),
        };

        McpResponse::success(
            request.id.clone(),
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": capabilities,
                "serverInfo": self.server_info
            }),
        )
    }

    fn handle_tools_list(&self, request: &McpRequest) -> McpResponse {
        McpResponse::success(
            request.id.clone(),
            json!({
                "tools": self.registry.definitions()
            }),
        )
    }

    async fn handle_tools_call(&self, request: &McpRequest) -> McpResponse {
        let Some(name) = request.params.get("name").and_then(|v| v.as_str()) else {
            return McpResponse::error(
                request.id.clone(),
                error_codes::INVALID_PARAMS,
                "missing tool name",
            );
        };
        let arguments = request
            .params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        info!(tool = name, "calling tool");

        let result = match self.registry.execute(name, arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, "tool call rejected: {}", e);
                return McpResponse::error(request.id.clone(), e.rpc_code(), e.to_string());
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(request.id.clone(), value),
            Err(e) => McpResponse::error(
                request.id.clone(),
                error_codes::INTERNAL_ERROR,
                e.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::orchestrator::Orchestrator;
    use crate::provider::ProviderId;
    use crate::router::ModelRouter;
    use crate::testing::{registry_of, CallLog, FakeGenerator};

    fn server(generators: Vec<FakeGenerator>) -> ScratchpadServer {
        let orchestrator = Orchestrator::new(ModelRouter::new(registry_of(generators)));
        ScratchpadServer::new(ToolContext::new(orchestrator, ServerConfig::default()))
    }

    async fn call(server: &mut ScratchpadServer, message: serde_json::Value) -> serde_json::Value {
        let response = server
            .handle_message(&message.to_string())
            .await
            .expect("request should get a response");
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let mut server = server(vec![]);

        let response = call(
            &mut server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        )
        .await;
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "scratchpad-mcp");
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], false);

        let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(server.handle_message(&notification.to_string()).await.is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let mut server = server(vec![]);

        let response = serde_json::to_value(server.handle_message("{not json").await.unwrap()).unwrap();
        assert_eq!(response["error"]["code"], error_codes::PARSE_ERROR);

        let response = call(&mut server, json!({ "jsonrpc": "2.0", "id": "a", "method": "resources/list" })).await;
        assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(response["id"], "a");
    }

    #[tokio::test]
    async fn test_null_id_gets_a_response() {
        let mut server = server(vec![]);

        let response = call(&mut server, json!({ "jsonrpc": "2.0", "id": null, "method": "ping" })).await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_tools_call_round_trip() {
        let log = CallLog::new();
        let mut server = server(vec![FakeGenerator::ok(ProviderId::Claude, "hello", &log)]);

        let response = call(
            &mut server,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "model_generate", "arguments": { "prompt": "hi", "model": "claude" } }
            }),
        )
        .await;
        assert_eq!(response["result"]["content"][0]["text"], "hello");
        assert_eq!(response["result"]["isError"], false);

        let response = call(
            &mut server,
            json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {} }),
        )
        .await;
        assert_eq!(response["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_skips_notifications() {
        let mut server = server(vec![]);
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();

        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let response: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(response["id"], 9);
    }
}
