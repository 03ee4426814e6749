pub mod browser;
pub mod browser_tools;
pub mod docs;
pub mod docs_tools;
pub mod extract;
pub mod notify;
pub mod registry;
pub mod resources;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webgate_core::{Config, Result};

use crate::browser::session::SessionRegistry;
use crate::docs::DocsClient;
use crate::notify::Notifier;
use crate::resources::ResourceCatalog;

pub use registry::ToolRegistry;

/// Shared state handed to every tool call. Built once at startup and
/// cloned per call; everything mutable lives behind the Arc'd members.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Config,
    pub sessions: Arc<SessionRegistry>,
    pub resources: Arc<ResourceCatalog>,
    pub notifier: Notifier,
    pub docs: Arc<DocsClient>,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// One content item of a tool result envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// The uniform success/failure envelope returned by every tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    pub fn with_image(mut self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.content.push(ContentItem::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        });
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult>;
}
