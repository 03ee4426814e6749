//! JSON-RPC 2.0 server over stdio: newline-delimited requests in on stdin,
//! responses and notifications out on stdout.
//!
//! Tool calls run concurrently (one task per request); responses share one
//! writer task with the asynchronous notification stream.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use webgate_core::Error;
use webgate_tools::notify::Notification;
use webgate_tools::{ToolContext, ToolRegistry};

const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const RESOURCE_NOT_FOUND: i64 = -32002;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone)]
pub struct McpServer {
    ctx: ToolContext,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(ctx: ToolContext, registry: Arc<ToolRegistry>) -> Self {
        Self { ctx, registry }
    }

    /// Serve until stdin closes.
    pub async fn run(
        self,
        notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> anyhow::Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout(), notifications)
            .await
    }

    async fn serve<R, W>(
        self,
        input: R,
        output: W,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> anyhow::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        // Writer task owns the output stream.
        let writer = tokio::spawn(async move {
            let mut output = output;
            while let Some(line) = out_rx.recv().await {
                if output.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if output.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = output.flush().await;
            }
        });

        // Notification drain: best effort, decoupled from any request.
        let notify_tx = out_tx.clone();
        let drain = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                let _ = notify_tx.send(notification_line(&notification));
            }
        });

        let mut lines = BufReader::new(input).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("unparseable request: {}", e);
                    let _ = out_tx.send(
                        error_response(Value::Null, &RpcError::new(PARSE_ERROR, e.to_string()))
                            .to_string(),
                    );
                    continue;
                }
            };

            // Client notifications carry no id and expect no reply.
            let Some(id) = request.id else {
                debug!(method = %request.method, "client notification ignored");
                continue;
            };

            let server = self.clone();
            let tx = out_tx.clone();
            tokio::spawn(async move {
                let response = match server.handle(&request.method, request.params).await {
                    Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                    Err(e) => error_response(id, &e),
                };
                let _ = tx.send(response.to_string());
            });
        }

        debug!("input closed, shutting down");
        // The drain task holds a writer-channel clone and the context keeps
        // the notification sender alive, so it must be stopped, not awaited.
        drain.abort();
        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": { "listChanged": true },
                    "logging": {},
                },
                "serverInfo": {
                    "name": "webgate",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),

            "ping" => Ok(json!({})),

            "tools/list" => Ok(json!({ "tools": self.registry.list_schemas() })),

            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing tool name"))?
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

                // Every tool failure stays inside the envelope; the
                // protocol layer only ever sees a result here.
                let result = self
                    .registry
                    .dispatch(&name, self.ctx.clone(), arguments)
                    .await;
                serde_json::to_value(result)
                    .map_err(|e| RpcError::new(PARSE_ERROR, e.to_string()))
            }

            "resources/list" => {
                let descriptors = self.ctx.resources.list().await;
                serde_json::to_value(json!({ "resources": descriptors }))
                    .map_err(|e| RpcError::new(PARSE_ERROR, e.to_string()))
            }

            "resources/read" => {
                let uri = params
                    .get("uri")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| RpcError::new(INVALID_PARAMS, "missing resource uri"))?;
                match self.ctx.resources.read(uri).await {
                    Ok(content) => Ok(json!({ "contents": [content] })),
                    Err(Error::NotFound(message)) => {
                        Err(RpcError::new(RESOURCE_NOT_FOUND, message))
                    }
                    Err(e) => {
                        error!(uri, error = %e, "resource read failed");
                        Err(RpcError::new(PARSE_ERROR, e.to_string()))
                    }
                }
            }

            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }
}

fn error_response(id: Value, error: &RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": error.code, "message": error.message },
    })
}

fn notification_line(notification: &Notification) -> String {
    let value = match notification {
        Notification::ConsoleMessage { line } => json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": { "level": "info", "logger": "console", "data": line },
        }),
        Notification::ResourcesListChanged => json!({
            "jsonrpc": "2.0",
            "method": "notifications/resources/list_changed",
            "params": {},
        }),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use webgate_core::Config;
    use webgate_tools::browser::page::{PageOps, PageSources};
    use webgate_tools::browser::session::{Connector, SessionRegistry};
    use webgate_tools::docs::DocsClient;
    use webgate_tools::notify::Notifier;
    use webgate_tools::resources::ResourceCatalog;

    struct StubPage;

    #[async_trait]
    impl PageOps for StubPage {
        async fn navigate(&self, _url: &str) -> webgate_core::Result<()> {
            Ok(())
        }
        async fn set_viewport(&self, _w: u32, _h: u32) -> webgate_core::Result<()> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> webgate_core::Result<()> {
            Ok(())
        }
        async fn fill(&self, _selector: &str, _value: &str) -> webgate_core::Result<()> {
            Ok(())
        }
        async fn wait_for_selector(
            &self,
            _selector: &str,
            _timeout_ms: u64,
        ) -> webgate_core::Result<()> {
            Ok(())
        }
        async fn screenshot(&self, _clip: Option<&str>) -> webgate_core::Result<Option<String>> {
            Ok(Some("cGl4".into()))
        }
        async fn evaluate(&self, _expression: &str) -> webgate_core::Result<Value> {
            Ok(Value::Null)
        }
        async fn text_content(
            &self,
            _selector: Option<&str>,
        ) -> webgate_core::Result<Vec<String>> {
            Ok(vec![])
        }
        async fn page_sources(&self) -> webgate_core::Result<PageSources> {
            Ok(PageSources::default())
        }
    }

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, _session_id: &str) -> webgate_core::Result<Arc<dyn PageOps>> {
            Ok(Arc::new(StubPage))
        }
    }

    fn test_server() -> (McpServer, mpsc::UnboundedReceiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        let ctx = ToolContext {
            config: Config::default(),
            sessions: Arc::new(SessionRegistry::new(Arc::new(StubConnector))),
            resources: Arc::new(ResourceCatalog::new()),
            notifier,
            docs: Arc::new(DocsClient::new(String::new())),
        };
        (
            McpServer::new(ctx, Arc::new(ToolRegistry::with_defaults())),
            rx,
        )
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let (server, _notifications) = test_server();
        let result = server.handle("initialize", json!({})).await.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["resources"]["listChanged"]
            .as_bool()
            .unwrap());
        assert_eq!(result["serverInfo"]["name"], "webgate");
    }

    #[tokio::test]
    async fn tools_list_returns_the_closed_set() {
        let (server, _notifications) = test_server();
        let result = server.handle("tools/list", json!({})).await.unwrap();
        assert_eq!(result["tools"].as_array().unwrap().len(), 15);
    }

    #[tokio::test]
    async fn unknown_tool_call_stays_inside_the_envelope() {
        let (server, _notifications) = test_server();
        let result = server
            .handle("tools/call", json!({ "name": "nope", "arguments": {} }))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("nope"));
    }

    #[tokio::test]
    async fn resources_read_unknown_uri_is_a_protocol_error() {
        let (server, _notifications) = test_server();
        let err = server
            .handle("resources/read", json!({ "uri": "bogus://x" }))
            .await
            .unwrap_err();
        assert_eq!(err.code, RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn resources_list_always_includes_console_log() {
        let (server, _notifications) = test_server();
        let result = server.handle("resources/list", json!({})).await.unwrap();
        let resources = result["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["uri"], "console://logs");
    }

    #[tokio::test]
    async fn screenshot_call_grows_the_resource_listing() {
        let (server, _notifications) = test_server();
        let result = server
            .handle(
                "tools/call",
                json!({ "name": "browser_screenshot", "arguments": { "name": "home" } }),
            )
            .await
            .unwrap();
        assert_eq!(result["isError"], false);

        let listing = server.handle("resources/list", json!({})).await.unwrap();
        assert_eq!(listing["resources"].as_array().unwrap().len(), 2);

        let read = server
            .handle("resources/read", json!({ "uri": "screenshot://home" }))
            .await
            .unwrap();
        assert_eq!(read["contents"][0]["blob"], "cGl4");
        assert_eq!(read["contents"][0]["mimeType"], "image/png");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (server, _notifications) = test_server();
        let err = server.handle("prompts/list", json!({})).await.unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_shuts_down_when_input_closes() {
        let (server, notifications) = test_server();
        let input = std::io::Cursor::new(
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n".to_vec(),
        );
        let (output, mut client) = tokio::io::duplex(4096);

        // The context still holds a live notification sender, so shutdown
        // must not wait for the notification stream to end.
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            server.serve(input, output, notifications),
        )
        .await
        .expect("server must shut down when input closes")
        .unwrap();

        use tokio::io::AsyncReadExt;
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        let value: Value = serde_json::from_str(response.trim()).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"], json!({}));
    }

    #[test]
    fn notification_lines_are_valid_json_rpc() {
        let line = notification_line(&Notification::ConsoleMessage {
            line: "[Session a][log] hi".into(),
        });
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "notifications/message");
        assert_eq!(value["params"]["data"], "[Session a][log] hi");

        let line = notification_line(&Notification::ResourcesListChanged);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "notifications/resources/list_changed");
    }
}
