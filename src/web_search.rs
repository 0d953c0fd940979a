//! External web search.
//!
//! The `search_web` tool first asks the summarizer model to turn free text
//! into one focused query (a single structured field, returned through a
//! `SearchQuery` function call), then runs it against the search provider.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use oracle_core::conversation::{ChatModel, Message, ToolSpec};

use crate::config::WebSearchConfig;
use crate::error::OracleError;
use crate::http;
use crate::prompts;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>>;
}

pub struct DisabledWebSearch;

#[async_trait]
impl WebSearch for DisabledWebSearch {
    async fn search(&self, _query: &str) -> Result<Vec<WebResult>> {
        Err(OracleError::ProviderNotConfigured("Web search").into())
    }
}

pub struct TavilySearch {
    client: reqwest::Client,
    url: String,
    api_key: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(config: &WebSearchConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.tavily.com/search".to_string()),
            api_key: http::api_key(&config.api_key_env)?,
            max_results: config.max_results,
        })
    }
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>> {
        let body = json!({
            "query": query,
            "max_results": self.max_results,
        });
        let resp = http::post_json(&self.client, &self.url, Some(&self.api_key), &body, 2, "Tavily")
            .await?;
        let results = resp
            .get("results")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Invalid Tavily response: missing results"))?;
        Ok(serde_json::from_value(results)?)
    }
}

pub fn create_web_search(config: &WebSearchConfig) -> Result<Arc<dyn WebSearch>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledWebSearch)),
        "tavily" => Ok(Arc::new(TavilySearch::new(config)?)),
        other => bail!("Unknown web_search provider: {}", other),
    }
}

fn search_query_spec() -> ToolSpec {
    ToolSpec {
        name: "SearchQuery".to_string(),
        description: "Search query for retrieval.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "search_query": {
                    "type": "string",
                    "description": "Query that is optimized web search."
                }
            },
            "required": ["search_query"]
        }),
    }
}

/// Ask `model` to rewrite `terms` as a web query.
///
/// Falls back to the model's plain text, then to `terms` unchanged.
pub async fn reformulate_query(model: &dyn ChatModel, terms: &str) -> Result<String> {
    let reply = model
        .complete(
            Some(prompts::SEARCH_QUERY_INSTRUCTIONS),
            &[Message::user(terms)],
            &[search_query_spec()],
        )
        .await?;

    let structured = reply
        .tool_calls
        .iter()
        .find(|c| c.name == "SearchQuery")
        .and_then(|c| c.arguments.get("search_query"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string);

    Ok(structured.unwrap_or_else(|| {
        let text = reply.content.answer_text();
        if text.trim().is_empty() {
            terms.to_string()
        } else {
            text.trim().to_string()
        }
    }))
}

/// Render results as tagged blocks separated by rules.
pub fn format_results(results: &[WebResult]) -> String {
    results
        .iter()
        .map(|r| format!("<Document href=\"{}\">\n{}\n</Document>", r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
