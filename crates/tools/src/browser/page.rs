//! Driveable page handle.
//!
//! `PageOps` is the seam between tools and the wire: production code drives
//! a remote page through `CdpPage`, tests substitute their own handle.

use async_trait::async_trait;
use serde_json::{json, Value};
use webgate_core::{Error, Result};

use super::cdp::CdpClient;

const FILL_WAIT_TIMEOUT_MS: u64 = 5_000;
const LOAD_WAIT_TIMEOUT_MS: u64 = 10_000;
const POLL_INTERVAL_MS: u64 = 100;

/// Raw page material scanned by structured-data extraction: body text,
/// inline script bodies, meta content attributes, and JSON-LD blocks.
#[derive(Debug, Clone, Default)]
pub struct PageSources {
    pub body_text: String,
    pub scripts: Vec<String>,
    pub metas: Vec<String>,
    pub json_ld: Vec<String>,
}

#[async_trait]
pub trait PageOps: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;
    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;
    /// Wait for `selector`, then set its value and fire input/change events.
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()>;
    /// Capture a base64 PNG of the page, or of the first element matching
    /// `clip_selector`. `Ok(None)` when the clip selector matches nothing.
    async fn screenshot(&self, clip_selector: Option<&str>) -> Result<Option<String>>;
    /// Evaluate a JS expression in the page context and return its value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;
    /// Text content of every match (every element when no selector), in
    /// document order.
    async fn text_content(&self, selector: Option<&str>) -> Result<Vec<String>>;
    async fn page_sources(&self) -> Result<PageSources>;
}

/// `PageOps` over a live CDP connection.
pub struct CdpPage {
    cdp: CdpClient,
}

impl CdpPage {
    pub fn new(cdp: CdpClient) -> Self {
        Self { cdp }
    }

    async fn wait_for_load(&self) -> Result<()> {
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis(LOAD_WAIT_TIMEOUT_MS);
        loop {
            let state = self.evaluate("document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                // Page is still loading; callers work with what is there.
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}

/// Encode a Rust string as a JS string literal.
pub(crate) fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl PageOps for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let result = self
            .cdp
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(err) = result.get("errorText").and_then(|v| v.as_str()) {
            if !err.is_empty() {
                return Err(Error::Provider(format!(
                    "navigation to {} failed: {}",
                    url, err
                )));
            }
        }
        self.wait_for_load().await
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.cdp
            .send_command(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": width,
                    "height": height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; el.click(); return true; }})()",
            sel = js_str(selector)
        );
        let found = self.evaluate(&script).await?;
        if found.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::Tool(format!(
                "no element matches selector: {}",
                selector
            )))
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.wait_for_selector(selector, FILL_WAIT_TIMEOUT_MS).await?;
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); el.value = {val}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            sel = js_str(selector),
            val = js_str(value)
        );
        let filled = self.evaluate(&script).await?;
        if filled.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::Tool(format!(
                "no element matches selector: {}",
                selector
            )))
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let probe = format!("!!document.querySelector({})", js_str(selector));
        let deadline =
            std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            if self.evaluate(&probe).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(Error::Tool(format!(
                    "timed out after {}ms waiting for selector: {}",
                    timeout_ms, selector
                )));
            }
            tokio::time::sleep(std::time::Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    async fn screenshot(&self, clip_selector: Option<&str>) -> Result<Option<String>> {
        let mut params = json!({ "format": "png" });

        if let Some(selector) = clip_selector {
            let script = format!(
                "(() => {{ const el = document.querySelector({sel}); if (!el) return null; \
                 const r = el.getBoundingClientRect(); \
                 return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; }})()",
                sel = js_str(selector)
            );
            let rect = self.evaluate(&script).await?;
            if rect.is_null() {
                return Ok(None);
            }
            params["clip"] = json!({
                "x": rect["x"],
                "y": rect["y"],
                "width": rect["width"],
                "height": rect["height"],
                "scale": 1,
            });
        }

        let result = self
            .cdp
            .send_command("Page.captureScreenshot", params)
            .await?;
        result
            .get("data")
            .and_then(|v| v.as_str())
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| Error::Provider("no screenshot data returned".to_string()))
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .cdp
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| details.get("text").and_then(|t| t.as_str()))
                .unwrap_or("script threw an exception");
            return Err(Error::Tool(format!("script execution failed: {}", message)));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn text_content(&self, selector: Option<&str>) -> Result<Vec<String>> {
        let sel = js_str(selector.unwrap_or("*"));
        let script = format!(
            "Array.from(document.querySelectorAll({sel})).map(el => el.textContent || '')"
        );
        let value = self.evaluate(&script).await?;
        let texts = value
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(texts)
    }

    async fn page_sources(&self) -> Result<PageSources> {
        let script = "(() => ({ \
            bodyText: document.body ? document.body.innerText : '', \
            scripts: Array.from(document.querySelectorAll('script:not([type]), script[type=\"text/javascript\"]')).map(s => s.textContent || ''), \
            metas: Array.from(document.querySelectorAll('meta[content]')).map(m => m.getAttribute('content') || ''), \
            jsonLd: Array.from(document.querySelectorAll('script[type=\"application/ld+json\"]')).map(s => s.textContent || '') \
        }))()";
        let value = self.evaluate(script).await?;

        Ok(PageSources {
            body_text: value
                .get("bodyText")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            scripts: string_array(value.get("scripts")),
            metas: string_array(value.get("metas")),
            json_ld: string_array(value.get("jsonLd")),
        })
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_str_escapes_quotes_and_backslashes() {
        assert_eq!(js_str("a"), "\"a\"");
        assert_eq!(js_str("a\"b"), "\"a\\\"b\"");
        assert_eq!(js_str("a\\b"), "\"a\\\\b\"");
    }
}
