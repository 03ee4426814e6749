//! Document-collaboration tools: direct delegations to the docs provider.
//! These never touch a browser session.

use async_trait::async_trait;
use serde_json::{json, Value};
use webgate_core::{Error, Result};

use crate::docs::{blocks_to_text, extract_page_id};
use crate::{Tool, ToolContext, ToolResult, ToolSchema};

fn page_url_property() -> Value {
    json!({
        "type": "string",
        "description": "URL of the target page (falls back to the configured default page)"
    })
}

/// Resolve the target page id from the pageUrl argument or the configured
/// default page URL.
fn resolve_page_id(ctx: &ToolContext, params: &Value) -> Result<String> {
    let url = params
        .get("pageUrl")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| ctx.config.default_page_url.clone())
        .ok_or_else(|| {
            Error::Validation(
                "no pageUrl given and no default page configured (WEBGATE_DEFAULT_PAGE_URL)"
                    .to_string(),
            )
        })?;
    extract_page_id(&url)
}

pub struct DocsReadPageTool;

#[async_trait]
impl Tool for DocsReadPageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "docs_read_page",
            description: "Read the content blocks of a collaboration page as plain text.",
            parameters: json!({
                "type": "object",
                "properties": { "pageUrl": page_url_property() },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let page_id = resolve_page_id(&ctx, &params)?;
        let listing = ctx.docs.list_blocks(&page_id).await?;
        Ok(ToolResult::text(blocks_to_text(&listing)))
    }
}

pub struct DocsAppendContentTool;

#[async_trait]
impl Tool for DocsAppendContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "docs_append_content",
            description: "Append a paragraph of content to a collaboration page.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "pageUrl": page_url_property(),
                    "content": { "type": "string", "description": "Text to append" }
                },
                "required": ["content"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|_| ())
            .ok_or_else(|| Error::Validation("Missing required parameter: content".into()))
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let content = params["content"].as_str().unwrap_or_default();
        let page_id = resolve_page_id(&ctx, &params)?;
        ctx.docs.append_paragraph(&page_id, content).await?;
        Ok(ToolResult::text(format!(
            "Appended content to page {}",
            page_id
        )))
    }
}

pub struct DocsReadCommentsTool;

#[async_trait]
impl Tool for DocsReadCommentsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "docs_read_comments",
            description: "List the comments on a collaboration page.",
            parameters: json!({
                "type": "object",
                "properties": { "pageUrl": page_url_property() },
                "required": []
            }),
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let page_id = resolve_page_id(&ctx, &params)?;
        let comments = ctx.docs.list_comments(&page_id).await?;
        Ok(ToolResult::text(serde_json::to_string_pretty(&comments)?))
    }
}

pub struct DocsAddCommentTool;

#[async_trait]
impl Tool for DocsAddCommentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "docs_add_comment",
            description: "Add a comment to a collaboration page.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "pageUrl": page_url_property(),
                    "comment": { "type": "string", "description": "Comment text" }
                },
                "required": ["comment"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("comment")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|_| ())
            .ok_or_else(|| Error::Validation("Missing required parameter: comment".into()))
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let comment = params["comment"].as_str().unwrap_or_default();
        let page_id = resolve_page_id(&ctx, &params)?;
        ctx.docs.create_comment(&page_id, comment).await?;
        Ok(ToolResult::text(format!(
            "Comment added to page {}",
            page_id
        )))
    }
}

pub struct DocsCreateRecordTool;

#[async_trait]
impl Tool for DocsCreateRecordTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "docs_create_record",
            description: "Create a record in a structured container, with a title and optional tags.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Record title" },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Tags mapped onto the container's multi-select property"
                    },
                    "databaseId": {
                        "type": "string",
                        "description": "Container id (falls back to the configured default container)"
                    }
                },
                "required": ["title"]
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|_| ())
            .ok_or_else(|| Error::Validation("Missing required parameter: title".into()))
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        let title = params["title"].as_str().unwrap_or_default();
        let tags: Vec<String> = params
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let database_id = params
            .get("databaseId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| ctx.config.default_database_id.clone())
            .ok_or_else(|| {
                Error::Validation(
                    "no databaseId given and no default container configured (WEBGATE_DEFAULT_DATABASE_ID)"
                        .to_string(),
                )
            })?;

        ctx.docs.create_record(&database_id, title, &tags).await?;
        Ok(ToolResult::text(format!(
            "Record '{}' created in container {}",
            title, database_id
        )))
    }
}
