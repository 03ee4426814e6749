//! Collaboration provider client (Notion-shaped REST API).
//!
//! Each method is a single authenticated call; non-2xx responses come back
//! as `Error::Provider` carrying the response body text.

use regex::Regex;
use serde_json::{json, Value};
use webgate_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const API_VERSION: &str = "2022-06-28";

pub struct DocsClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DocsClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder> {
        if self.token.is_empty() {
            return Err(Error::Config(
                "collaboration provider token not configured (WEBGATE_DOCS_TOKEN)".to_string(),
            ));
        }
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Notion-Version", API_VERSION))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Provider(format!("collaboration request failed: {}", e)))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "collaboration API returned {}: {}",
                status, body
            )));
        }
        serde_json::from_str(&body)
            .map_err(|e| Error::Provider(format!("invalid collaboration response: {}", e)))
    }

    /// List child blocks of a page.
    pub async fn list_blocks(&self, page_id: &str) -> Result<Value> {
        let builder = self.request(
            reqwest::Method::GET,
            &format!("/blocks/{}/children?page_size=100", page_id),
        )?;
        self.send(builder).await
    }

    /// Append one paragraph block to a page.
    pub async fn append_paragraph(&self, page_id: &str, text: &str) -> Result<Value> {
        let body = json!({
            "children": [{
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [{ "type": "text", "text": { "content": text } }]
                }
            }]
        });
        let builder = self
            .request(
                reqwest::Method::PATCH,
                &format!("/blocks/{}/children", page_id),
            )?
            .json(&body);
        self.send(builder).await
    }

    /// List comments on a page.
    pub async fn list_comments(&self, page_id: &str) -> Result<Value> {
        let builder = self.request(
            reqwest::Method::GET,
            &format!("/comments?block_id={}", page_id),
        )?;
        self.send(builder).await
    }

    /// Add a comment to a page.
    pub async fn create_comment(&self, page_id: &str, text: &str) -> Result<Value> {
        let body = json!({
            "parent": { "page_id": page_id },
            "rich_text": [{ "type": "text", "text": { "content": text } }]
        });
        let builder = self.request(reqwest::Method::POST, "/comments")?.json(&body);
        self.send(builder).await
    }

    /// Create a record in a structured container, mapping the title and tag
    /// list onto named properties.
    pub async fn create_record(
        &self,
        database_id: &str,
        title: &str,
        tags: &[String],
    ) -> Result<Value> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": record_properties(title, tags),
        });
        let builder = self.request(reqwest::Method::POST, "/pages")?.json(&body);
        self.send(builder).await
    }
}

/// Shape a caller-chosen title and tag list into provider properties.
fn record_properties(title: &str, tags: &[String]) -> Value {
    json!({
        "Title": {
            "title": [{ "type": "text", "text": { "content": title } }]
        },
        "Tags": {
            "multi_select": tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>()
        }
    })
}

/// Extract the stable 32-hex-char page identifier out of a caller-supplied
/// URL (hyphenated or not). Title characters that happen to be hex merge
/// into the front of the run once hyphens are stripped; the id is always
/// the tail of the run.
pub fn extract_page_id(url: &str) -> Result<String> {
    let stripped = url.replace('-', "");
    let re = Regex::new(r"[0-9a-fA-F]{32,}").expect("static pattern");
    re.find_iter(&stripped)
        .last()
        .map(|m| {
            let run = m.as_str();
            run[run.len() - 32..].to_lowercase()
        })
        .ok_or_else(|| {
            Error::Validation(format!("could not extract a page id from URL: {}", url))
        })
}

/// Flatten a block-children listing into plain text, one block per line.
pub fn blocks_to_text(listing: &Value) -> String {
    let Some(blocks) = listing.get("results").and_then(|v| v.as_array()) else {
        return String::new();
    };
    blocks
        .iter()
        .filter_map(|block| {
            let kind = block.get("type").and_then(|v| v.as_str())?;
            let rich_text = block.get(kind)?.get("rich_text")?.as_array()?;
            let line: String = rich_text
                .iter()
                .filter_map(|rt| rt.get("plain_text").and_then(|v| v.as_str()))
                .collect();
            if line.is_empty() {
                None
            } else {
                Some(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
