//! Browser tools: session lifecycle, navigation, capture, interaction,
//! script execution, and content extraction against remote sessions.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;
use webgate_core::{Error, Result};

use crate::browser::page::js_str;
use crate::extract::{extract_json_objects, scan_page_sources};
use crate::{Tool, ToolContext, ToolResult, ToolSchema};

const DEFAULT_SESSION_ID: &str = "default";
const DEFAULT_VIEWPORT_WIDTH: u32 = 800;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 600;

fn session_id(params: &Value) -> &str {
    params
        .get("sessionId")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_SESSION_ID)
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("Missing required parameter: {}", key)))
}

fn session_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Session identifier (default: 'default'). A session is created on first use."
    })
}

// ─── Session lifecycle ───────────────────────────────────────────────────────

pub struct CreateSessionTool;

#[async_trait]
impl Tool for CreateSessionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_create_session",
            description: "Create a new remote browser session (or confirm an existing one).",
            parameters: json!({
                "type": "object",
                "properties": { "sessionId": session_id_property() },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let id = session_id(&params);
        let session = ctx.sessions.create(id).await?;
        Ok(ToolResult::text(format!(
            "Browser session '{}' is ready",
            session.id
        )))
    }
}

pub struct CloseSessionTool;

#[async_trait]
impl Tool for CloseSessionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_close_session",
            description: "Release a browser session and its remote connection.",
            parameters: json!({
                "type": "object",
                "properties": { "sessionId": session_id_property() },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let id = session_id(&params);
        ctx.sessions.close(id).await?;
        Ok(ToolResult::text(format!("Browser session '{}' closed", id)))
    }
}

// ─── Navigation ──────────────────────────────────────────────────────────────

pub struct NavigateTool;

#[async_trait]
impl Tool for NavigateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_navigate",
            description: "Navigate the session's page to a URL.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL to navigate to" },
                    "sessionId": session_id_property()
                },
                "required": ["url"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "url").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let url = required_str(&params, "url")?;
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        session.page.navigate(url).await?;
        Ok(ToolResult::text(format!("Navigated to {}", url)))
    }
}

// ─── Screenshot capture ──────────────────────────────────────────────────────

pub struct ScreenshotTool;

#[async_trait]
impl Tool for ScreenshotTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_screenshot",
            description: "Capture a screenshot of the page or a single element. \
                          Stored as a readable resource under screenshot://<name>.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Name for the stored screenshot (replaces any prior artifact of the same name)" },
                    "selector": { "type": "string", "description": "CSS selector; captures only the matched element" },
                    "width": { "type": "integer", "description": "Viewport width in pixels (default: 800)" },
                    "height": { "type": "integer", "description": "Viewport height in pixels (default: 600)" },
                    "sessionId": session_id_property()
                },
                "required": ["name"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "name").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let name = required_str(&params, "name")?;
        let selector = params.get("selector").and_then(|v| v.as_str());
        let width = params
            .get("width")
            .and_then(|v| v.as_u64())
            .map(|w| w as u32)
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH);
        let height = params
            .get("height")
            .and_then(|v| v.as_u64())
            .map(|h| h as u32)
            .unwrap_or(DEFAULT_VIEWPORT_HEIGHT);

        let session = ctx.sessions.resolve(session_id(&params)).await?;
        session.page.set_viewport(width, height).await?;

        let Some(data) = session.page.screenshot(selector).await? else {
            // Zero-match selector is a failure result, not a thrown error,
            // and leaves the catalog untouched.
            return Ok(ToolResult::error(format!(
                "Element not found: {}",
                selector.unwrap_or_default()
            )));
        };

        let byte_len = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map(|bytes| bytes.len())
            .unwrap_or(0);

        ctx.resources.store_screenshot(name, data.clone()).await;
        ctx.notifier.resources_list_changed();
        debug!(name, width, height, bytes = byte_len, "screenshot stored");

        Ok(ToolResult::text(format!(
            "Screenshot '{}' taken at {}x{} ({} bytes)",
            name, width, height, byte_len
        ))
        .with_image(data, "image/png"))
    }
}

// ─── Interaction ─────────────────────────────────────────────────────────────

pub struct ClickTool;

#[async_trait]
impl Tool for ClickTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_click",
            description: "Click the first element matching a CSS selector.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the element to click" },
                    "sessionId": session_id_property()
                },
                "required": ["selector"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "selector").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let selector = required_str(&params, "selector")?;
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        session.page.click(selector).await?;
        Ok(ToolResult::text(format!("Clicked: {}", selector)))
    }
}

pub struct FillTool;

#[async_trait]
impl Tool for FillTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_fill",
            description: "Fill an input field: waits for the selector, then sets the value.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector of the input" },
                    "value": { "type": "string", "description": "Value to fill in" },
                    "sessionId": session_id_property()
                },
                "required": ["selector", "value"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "selector")?;
        required_str(params, "value")?;
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let selector = required_str(&params, "selector")?;
        let value = required_str(&params, "value")?;
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        session.page.fill(selector, value).await?;
        Ok(ToolResult::text(format!(
            "Filled {} with: {}",
            selector, value
        )))
    }
}

// ─── Script execution ────────────────────────────────────────────────────────

pub struct EvaluateTool;

/// Wrap a caller script so console output during execution is captured and
/// returned alongside the result. Console methods are restored in the
/// `finally` block, so a throwing script still unwinds the interception
/// before the failure is reported.
fn console_capture_wrapper(script: &str) -> String {
    format!(
        "(() => {{ \
         const logs = []; \
         const original = {{}}; \
         ['log','info','warn','error'].forEach(m => {{ \
             original[m] = console[m]; \
             console[m] = (...args) => {{ \
                 logs.push(m + ': ' + args.map(String).join(' ')); \
                 original[m].apply(console, args); \
             }}; \
         }}); \
         try {{ \
             const result = eval({script}); \
             return {{ result, logs }}; \
         }} finally {{ \
             ['log','info','warn','error'].forEach(m => {{ console[m] = original[m]; }}); \
         }} \
         }})()",
        script = js_str(script)
    )
}

#[async_trait]
impl Tool for EvaluateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_evaluate",
            description: "Execute JavaScript in the page context. Console output produced by \
                          the script is captured and returned with the result.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "script": { "type": "string", "description": "JavaScript to execute" },
                    "sessionId": session_id_property()
                },
                "required": ["script"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        required_str(params, "script").map(|_| ())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let script = required_str(&params, "script")?;
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        let value = session
            .page
            .evaluate(&console_capture_wrapper(script))
            .await?;

        let result = value.get("result").cloned().unwrap_or(Value::Null);
        let logs: Vec<String> = value
            .get("logs")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|l| l.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolResult::text(format!(
            "Execution result:\n{}\n\nConsole output:\n{}",
            serde_json::to_string_pretty(&result)?,
            logs.join("\n")
        )))
    }
}

// ─── Content extraction ──────────────────────────────────────────────────────

pub struct GetContentTool;

#[async_trait]
impl Tool for GetContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_get_content",
            description: "Extract the text content of matched elements (all elements when no selector is given).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector to scope the extraction" },
                    "sessionId": session_id_property()
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let selector = params.get("selector").and_then(|v| v.as_str());
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        let texts = session.page.text_content(selector).await?;
        Ok(ToolResult::text(serde_json::to_string_pretty(&texts)?))
    }
}

pub struct GetJsonTool;

#[async_trait]
impl Tool for GetJsonTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_get_json",
            description: "Scan the page (body text, inline scripts, meta tags, JSON-LD) for \
                          embedded JSON objects and return every parseable one.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector; scans only the text of matched elements" },
                    "sessionId": session_id_property()
                },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let session = ctx.sessions.resolve(session_id(&params)).await?;
        let found = match params.get("selector").and_then(|v| v.as_str()) {
            Some(selector) => {
                let texts = session.page.text_content(Some(selector)).await?;
                texts
                    .iter()
                    .flat_map(|text| extract_json_objects(text))
                    .collect()
            }
            None => scan_page_sources(&session.page.page_sources().await?),
        };
        Ok(ToolResult::text(serde_json::to_string_pretty(&json!({
            "found": found.len(),
            "data": found,
        }))?))
    }
}

// ─── Bulk parallel navigation ────────────────────────────────────────────────

pub struct ParallelSessionsTool;

#[async_trait]
impl Tool for ParallelSessionsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "browser_parallel_sessions",
            description: "Open multiple browser sessions concurrently, navigate each to its URL, \
                          and collect the extracted text (or the failure) per session.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sessions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "url": { "type": "string", "description": "URL to open" },
                                "id": { "type": "string", "description": "Session identifier for this item" }
                            },
                            "required": ["url", "id"]
                        },
                        "description": "Sessions to open in parallel"
                    }
                },
                "required": ["sessions"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        let items = params
            .get("sessions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::Validation("Missing required parameter: sessions".into()))?;
        if items.is_empty() {
            return Err(Error::Validation("'sessions' must not be empty".into()));
        }
        for item in items {
            if item.get("url").and_then(|v| v.as_str()).is_none()
                || item.get("id").and_then(|v| v.as_str()).is_none()
            {
                return Err(Error::Validation(
                    "each session item requires 'url' and 'id'".into(),
                ));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let items: Vec<(String, String)> = params["sessions"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        let id = item.get("id")?.as_str()?.to_string();
                        let url = item.get("url")?.as_str()?.to_string();
                        Some((id, url))
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Fan out: every item gets its own session and navigation; one
        // item's failure never aborts the others.
        let futures = items.iter().map(|(id, url)| {
            let ctx = ctx.clone();
            async move {
                let outcome = async {
                    let session = ctx.sessions.resolve(id).await?;
                    session.page.navigate(url).await?;
                    let texts = session.page.text_content(None).await?;
                    Ok::<String, Error>(texts.join("\n"))
                }
                .await;

                match outcome {
                    Ok(content) => json!({
                        "id": id,
                        "url": url,
                        "success": true,
                        "content": content,
                    }),
                    Err(e) => json!({
                        "id": id,
                        "url": url,
                        "success": false,
                        "error": e.to_string(),
                    }),
                }
            }
        });

        let results: Vec<Value> = futures::future::join_all(futures).await;
        Ok(ToolResult::text(serde_json::to_string_pretty(&results)?))
    }
}
