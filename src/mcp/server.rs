use crate::app::App;
use crate::config::BridgeConfig;
use crate::constants::protocol::{SERVER_NAME, VERSION as PROTOCOL_VERSION};
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

/// JSON-RPC front end over the tool executor. Cloning is cheap; every
/// in-flight request holds its own handle.
#[derive(Clone)]
pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    fn handle_initialize(&self) -> Value {
        let mut server_info = serde_json::json!({
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        });
        if let (Some(title), Some(info)) = (&self.app.title, server_info.as_object_mut()) {
            info.insert("title".to_string(), Value::String(title.clone()));
        }
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": server_info,
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": self.app.executor.list_tools() })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| McpError::new(ErrorCode::InvalidParams, "Missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        match self.app.executor.execute(name, args).await {
            Ok(result) => serde_json::to_value(result)
                .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string())),
            Err(err) => {
                self.app.logger.warn(
                    "Tool call failed",
                    Some(&serde_json::json!({
                        "tool": name,
                        "kind": err.kind.as_str(),
                        "message": err.message,
                    })),
                );
                Err(McpError::from_tool_error(name, &err))
            }
        }
    }

    /// Handles one input line. `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError,
                    "Parse error",
                ))
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(parsed) {
            Ok(request) => request,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::InvalidRequest,
                    "Invalid request",
                ))
            }
        };
        if request.is_notification() {
            if !request.method.starts_with("notifications/") {
                self.app.logger.debug(
                    "Ignoring notification",
                    Some(&serde_json::json!({"method": request.method})),
                );
            }
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(&request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::from_error(id, err),
            },
            _ => JsonRpcResponse::failure(id, ErrorCode::MethodNotFound, "Method not found"),
        };
        Some(response)
    }

    /// Reads requests line by line and answers each from its own task, so a
    /// slow tool call does not hold up the rest. Returns once input is closed
    /// and every in-flight response has been written.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(payload) = rx.recv().await {
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), std::io::Error>(())
        });

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let server = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = server.handle_line(&line).await {
                    let _ = tx.send(response.to_line());
                }
            });
        }
        drop(tx);

        writer_task
            .await
            .map_err(|err| ToolError::internal(format!("Response writer stopped: {}", err)))??;
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        self.app.logger.info("Serving on stdio", None);
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

pub async fn run_stdio(config: BridgeConfig) -> Result<(), ToolError> {
    let app = App::initialize(config).await?;
    McpServer::new(app).run_stdio().await
}
