//! Resource catalog: named artifacts produced as side effects of tool
//! execution and exposed through the protocol's resource operations.
//!
//! Two stores: the console log (append-only, unbounded, insertion order is
//! the only index) and screenshots (name -> base64 payload, last write
//! wins). Listings are computed on demand; nothing is cached.

use serde::Serialize;
use tokio::sync::Mutex;
use webgate_core::{Error, Result};

pub const CONSOLE_LOG_URI: &str = "console://logs";
pub const SCREENSHOT_URI_PREFIX: &str = "screenshot://";

#[derive(Debug, Clone)]
pub struct ConsoleLogEntry {
    pub session_id: String,
    pub level: String,
    pub text: String,
}

impl ConsoleLogEntry {
    pub fn formatted(&self) -> String {
        format!("[Session {}][{}] {}", self.session_id, self.level, self.text)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub name: String,
}

/// Payload of a resource read; exactly one of `text`/`blob` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Default)]
pub struct ResourceCatalog {
    console_logs: Mutex<Vec<ConsoleLogEntry>>,
    /// Vec-backed so listing order is first-insertion order even across
    /// overwrites.
    screenshots: Mutex<Vec<(String, String)>>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one console log entry; returns the formatted line.
    pub async fn append_console(&self, session_id: &str, level: &str, text: &str) -> String {
        let entry = ConsoleLogEntry {
            session_id: session_id.to_string(),
            level: level.to_string(),
            text: text.to_string(),
        };
        let line = entry.formatted();
        self.console_logs.lock().await.push(entry);
        line
    }

    /// Store a screenshot under `name`, replacing any prior payload.
    pub async fn store_screenshot(&self, name: &str, data_base64: String) {
        let mut shots = self.screenshots.lock().await;
        if let Some(slot) = shots.iter_mut().find(|(n, _)| n == name) {
            slot.1 = data_base64;
        } else {
            shots.push((name.to_string(), data_base64));
        }
    }

    /// Current descriptors: the console log first, then one per stored
    /// screenshot name in insertion order.
    pub async fn list(&self) -> Vec<ResourceDescriptor> {
        let mut descriptors = vec![ResourceDescriptor {
            uri: CONSOLE_LOG_URI.to_string(),
            mime_type: "text/plain".to_string(),
            name: "Browser console logs".to_string(),
        }];
        for (name, _) in self.screenshots.lock().await.iter() {
            descriptors.push(ResourceDescriptor {
                uri: format!("{}{}", SCREENSHOT_URI_PREFIX, name),
                mime_type: "image/png".to_string(),
                name: format!("Screenshot: {}", name),
            });
        }
        descriptors
    }

    pub async fn read(&self, uri: &str) -> Result<ResourceContent> {
        if uri == CONSOLE_LOG_URI {
            let logs = self.console_logs.lock().await;
            let text = logs
                .iter()
                .map(|entry| entry.formatted())
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ResourceContent {
                uri: uri.to_string(),
                mime_type: "text/plain".to_string(),
                text: Some(text),
                blob: None,
            });
        }

        if let Some(name) = uri.strip_prefix(SCREENSHOT_URI_PREFIX) {
            let shots = self.screenshots.lock().await;
            if let Some((_, data)) = shots.iter().find(|(n, _)| n == name) {
                return Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: "image/png".to_string(),
                    text: None,
                    blob: Some(data.clone()),
                });
            }
            return Err(Error::NotFound(format!("screenshot '{}' not found", name)));
        }

        Err(Error::NotFound(format!("unknown resource URI: {}", uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_is_console_log_plus_screenshots() {
        let catalog = ResourceCatalog::new();
        assert_eq!(catalog.list().await.len(), 1);

        catalog.store_screenshot("home", "AAAA".into()).await;
        catalog.store_screenshot("cart", "BBBB".into()).await;

        let descriptors = catalog.list().await;
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].uri, CONSOLE_LOG_URI);
        assert_eq!(descriptors[1].uri, "screenshot://home");
        assert_eq!(descriptors[2].uri, "screenshot://cart");
    }

    #[tokio::test]
    async fn duplicate_screenshot_name_keeps_second_payload() {
        let catalog = ResourceCatalog::new();
        catalog.store_screenshot("home", "first".into()).await;
        catalog.store_screenshot("home", "second".into()).await;

        assert_eq!(catalog.list().await.len(), 2);
        let content = catalog.read("screenshot://home").await.unwrap();
        assert_eq!(content.blob.as_deref(), Some("second"));
        assert_eq!(content.mime_type, "image/png");
    }

    #[tokio::test]
    async fn screenshot_overwrite_preserves_listing_order() {
        let catalog = ResourceCatalog::new();
        catalog.store_screenshot("a", "1".into()).await;
        catalog.store_screenshot("b", "2".into()).await;
        catalog.store_screenshot("a", "3".into()).await;

        let descriptors = catalog.list().await;
        assert_eq!(descriptors[1].uri, "screenshot://a");
        assert_eq!(descriptors[2].uri, "screenshot://b");
    }

    #[tokio::test]
    async fn console_log_reads_back_in_capture_order() {
        let catalog = ResourceCatalog::new();
        catalog.append_console("a", "log", "first").await;
        catalog.append_console("b", "error", "second").await;
        catalog.append_console("a", "warning", "third").await;

        let content = catalog.read(CONSOLE_LOG_URI).await.unwrap();
        let text = content.text.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[Session a][log] first",
                "[Session b][error] second",
                "[Session a][warning] third",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_uri_is_not_found() {
        let catalog = ResourceCatalog::new();
        assert!(matches!(
            catalog.read("screenshot://missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            catalog.read("bogus://thing").await,
            Err(Error::NotFound(_))
        ));
    }
}
