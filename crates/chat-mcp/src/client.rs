use crate::wire::{
    CallToolResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ToolsListResult, MCP_PROTOCOL_VERSION,
};
use async_trait::async_trait;
use chat_core::error::{ChatError, Result};
use chat_core::provider::ToolProvider;
use chat_core::types::ToolDescriptor;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

struct ServerIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Client for one MCP server process.
///
/// The server is launched once at connection time and lives for the
/// session. Requests are serialised one at a time behind a lock — the
/// conversation never issues concurrent tool invocations, and MCP frames on
/// a single pipe must not interleave anyway.
pub struct McpClient {
    name: String,
    io: Mutex<Option<ServerIo>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl McpClient {
    /// Launch the server and run the MCP handshake. Any failure here is
    /// fatal to session startup; there is no retry.
    pub async fn connect(
        name: &str,
        command: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Self> {
        let client = Self::spawn(name, command, args, timeout)?;
        client.initialize().await?;
        Ok(client)
    }

    fn spawn(name: &str, command: &str, args: &[String], timeout: Duration) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // The server's stderr passes through; MCP servers log there.
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChatError::ToolTransport {
                server: name.to_string(),
                message: format!("failed to launch '{command}': {e}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ChatError::ToolTransport {
            server: name.to_string(),
            message: "child stdin unavailable".into(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChatError::ToolTransport {
                server: name.to_string(),
                message: "child stdout unavailable".into(),
            })?;

        Ok(Self {
            name: name.to_string(),
            io: Mutex::new(Some(ServerIo {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
            next_id: AtomicU64::new(1),
            timeout,
        })
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-chat",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        match self.request("initialize", Some(params)).await? {
            Ok(_) => {}
            Err(rpc) => {
                return Err(self.transport_err(format!(
                    "initialize rejected: {} (code {})",
                    rpc.message, rpc.code
                )));
            }
        }
        self.notify("notifications/initialized", None).await?;
        debug!(server = %self.name, "MCP handshake complete");
        Ok(())
    }

    /// Send one request and wait for its response. The outer `Result` is
    /// the transport layer; the inner one is the server's JSON-RPC answer.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<std::result::Result<Value, JsonRpcError>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let mut guard = self.io.lock().await;
        let io = guard
            .as_mut()
            .ok_or_else(|| self.transport_err("provider is shut down".into()))?;

        write_frame(&mut io.stdin, &frame)
            .await
            .map_err(|e| self.transport_err(format!("write failed: {e}")))?;

        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(self.timeout, io.stdout.read_line(&mut line))
                .await
                .map_err(|_| {
                    self.transport_err(format!(
                        "no response to '{method}' within {}s",
                        self.timeout.as_secs()
                    ))
                })?
                .map_err(|e| self.transport_err(format!("read failed: {e}")))?;
            if read == 0 {
                return Err(self.transport_err("server closed its stdout".into()));
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let response: JsonRpcResponse = serde_json::from_str(line)
                .map_err(|e| self.transport_err(format!("malformed frame: {e}")))?;

            // Server-initiated notifications interleave with responses on
            // the same pipe; only the matching id answers this request.
            if response.id != Some(id) {
                debug!(server = %self.name, frame = %line, "Skipping unrelated frame");
                continue;
            }
            return match response.error {
                Some(error) => Ok(Err(error)),
                None => Ok(Ok(response.result.unwrap_or(Value::Null))),
            };
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        let mut guard = self.io.lock().await;
        let io = guard
            .as_mut()
            .ok_or_else(|| self.transport_err("provider is shut down".into()))?;
        write_frame(&mut io.stdin, &frame)
            .await
            .map_err(|e| self.transport_err(format!("write failed: {e}")))
    }

    /// Release the server process. Idempotent: the first call kills and
    /// reaps the child, later calls are no-ops.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.io.lock().await;
        if let Some(mut io) = guard.take() {
            let _ = io.child.start_kill();
            let _ = io.child.wait().await;
            debug!(server = %self.name, "Tool provider shut down");
        }
        Ok(())
    }

    fn transport_err(&self, message: String) -> ChatError {
        ChatError::ToolTransport {
            server: self.name.clone(),
            message,
        }
    }
}

async fn write_frame(stdin: &mut ChildStdin, frame: &str) -> std::io::Result<()> {
    stdin.write_all(frame.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

#[async_trait]
impl ToolProvider for McpClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        match self.request("tools/list", None).await? {
            Ok(value) => {
                let parsed: ToolsListResult = serde_json::from_value(value)?;
                Ok(parsed.tools.into_iter().map(Into::into).collect())
            }
            Err(rpc) => Err(self.transport_err(format!("tools/list rejected: {}", rpc.message))),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let params = json!({"name": name, "arguments": arguments});
        match self.request("tools/call", Some(params)).await? {
            Ok(value) => {
                let result: CallToolResult = serde_json::from_value(value)?;
                extract_text(name, result)
            }
            Err(rpc) => Err(ChatError::ToolRejected {
                tool: name.to_string(),
                message: rpc.message,
            }),
        }
    }
}

/// Pull the textual payload out of a tool result. The first content item
/// must be plain text; richer content types fail loudly rather than pass
/// through mangled.
fn extract_text(tool: &str, result: CallToolResult) -> Result<String> {
    if result.is_error {
        let message: Vec<&str> = result
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect();
        let message = if message.is_empty() {
            "tool reported an error".to_string()
        } else {
            message.join("\n")
        };
        return Err(ChatError::ToolRejected {
            tool: tool.to_string(),
            message,
        });
    }

    let first = result
        .content
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::ToolRejected {
            tool: tool.to_string(),
            message: "returned no content".into(),
        })?;
    if first.kind != "text" {
        return Err(ChatError::ToolRejected {
            tool: tool.to_string(),
            message: format!("returned unsupported content type '{}'", first.kind),
        });
    }
    first.text.ok_or_else(|| ChatError::ToolRejected {
        tool: tool.to_string(),
        message: "text content item had no text".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(text: &str) -> CallToolResult {
        serde_json::from_value(json!({
            "content": [{"type": "text", "text": text}]
        }))
        .unwrap()
    }

    #[test]
    fn test_extract_text_happy_path() {
        assert_eq!(extract_text("t", text_result("42")).unwrap(), "42");
    }

    #[test]
    fn test_extract_text_error_flag_rejects() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "city not found"}],
            "isError": true
        }))
        .unwrap();
        let err = extract_text("get_weather", result).unwrap_err();
        match err {
            ChatError::ToolRejected { tool, message } => {
                assert_eq!(tool, "get_weather");
                assert_eq!(message, "city not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_extract_text_fails_loudly_without_text() {
        let empty: CallToolResult = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(matches!(
            extract_text("t", empty).unwrap_err(),
            ChatError::ToolRejected { .. }
        ));

        let image: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "image", "data": "..."}]
        }))
        .unwrap();
        let err = extract_text("t", image).unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_releases_child_exactly_once() {
        let client =
            McpClient::spawn("test", "cat", &[], Duration::from_secs(5)).unwrap();

        client.shutdown().await.unwrap();
        // Second shutdown is a no-op, not a double kill.
        client.shutdown().await.unwrap();

        // The transport reports the provider as gone afterwards.
        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, ChatError::ToolTransport { .. }));
    }
}
