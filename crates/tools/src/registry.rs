//! Tool registry and dispatch.
//!
//! Dispatch never lets a failure escape: unknown tool names, validation
//! failures, and handler errors all come back as failure-flagged result
//! envelopes. Only the protocol's resource-read path reports errors
//! differently (a lookup failure at that boundary).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::browser_tools::{
    ClickTool, CloseSessionTool, CreateSessionTool, EvaluateTool, FillTool, GetContentTool,
    GetJsonTool, NavigateTool, ParallelSessionsTool, ScreenshotTool,
};
use crate::docs_tools::{
    DocsAddCommentTool, DocsAppendContentTool, DocsCreateRecordTool, DocsReadCommentsTool,
    DocsReadPageTool,
};
use crate::{Tool, ToolContext, ToolResult};

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the full closed tool set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Session lifecycle
        registry.register(Arc::new(CreateSessionTool));
        registry.register(Arc::new(CloseSessionTool));

        // Navigation and interaction
        registry.register(Arc::new(NavigateTool));
        registry.register(Arc::new(ClickTool));
        registry.register(Arc::new(FillTool));

        // Capture and extraction
        registry.register(Arc::new(ScreenshotTool));
        registry.register(Arc::new(EvaluateTool));
        registry.register(Arc::new(GetContentTool));
        registry.register(Arc::new(GetJsonTool));

        // Bulk fan-out
        registry.register(Arc::new(ParallelSessionsTool));

        // Document collaboration
        registry.register(Arc::new(DocsReadPageTool));
        registry.register(Arc::new(DocsAppendContentTool));
        registry.register(Arc::new(DocsReadCommentsTool));
        registry.register(Arc::new(DocsAddCommentTool));
        registry.register(Arc::new(DocsCreateRecordTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool declarations in protocol listing shape.
    pub fn list_schemas(&self) -> Vec<Value> {
        let mut schemas: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                let schema = tool.schema();
                json!({
                    "name": schema.name,
                    "description": schema.description,
                    "inputSchema": schema.parameters,
                })
            })
            .collect();
        schemas.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        schemas
    }

    /// Execute a tool by name. Every failure mode becomes an error
    /// envelope; this method never returns an error to the caller.
    pub async fn dispatch(&self, name: &str, ctx: ToolContext, params: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolResult::error(format!("Unknown tool: {}", name));
        };

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "tool validation failed");
            return ToolResult::error(e.to_string());
        }

        debug!(tool = name, "executing tool");
        match tool.execute(ctx, params).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}
