//! Chat-completion providers.
//!
//! - **[`DisabledChat`]**: fails every call.
//! - **[`OpenAiChat`]**: `POST {url}/chat/completions` on any OpenAI-compatible endpoint.
//! - **[`OllamaChat`]**: `POST {url}/api/chat` on a local Ollama instance.
//!
//! History is converted to the wire format by [`wire_messages`]. Tool
//! results whose originating call is no longer in the history (it was
//! summarized away) are sent as user text, and tool calls that never got a
//! result are dropped from their assistant message, since both providers
//! reject unpaired tool messages.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use oracle_core::conversation::{ChatModel, Content, Message, Role, ToolCall, ToolSpec};

use crate::config::ChatConfig;
use crate::error::OracleError;
use crate::http;

pub struct DisabledChat {
    section: &'static str,
}

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _system: Option<&str>,
        _messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<Message> {
        Err(OracleError::ProviderNotConfigured(self.section).into())
    }
}

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key: http::api_key(&config.api_key_env)?,
            model: required_model(config)?,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message> {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": wire_messages(system, messages, ArgumentEncoding::String),
        });
        if !tools.is_empty() {
            body["tools"] = wire_tools(tools);
        }

        let resp = http::post_json(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        let message = resp
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message"))?;
        Ok(parse_reply(message))
    }
}

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: format!("{}/api/chat", base.trim_end_matches('/')),
            model: required_model(config)?,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message> {
        let mut body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": wire_messages(system, messages, ArgumentEncoding::Object),
        });
        if !tools.is_empty() {
            body["tools"] = wire_tools(tools);
        }

        let resp =
            http::post_json(&self.client, &self.url, None, &body, self.max_retries, "Ollama").await?;
        let message = resp
            .get("message")
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message"))?;
        Ok(parse_reply(message))
    }
}

fn required_model(config: &ChatConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("model required for {} chat provider", config.provider))
}

/// Build the configured model. `section` names the config section in errors.
pub fn create_chat_model(config: &ChatConfig, section: &'static str) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat { section })),
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown {} provider: {}", section, other),
    }
}

/// OpenAI sends tool arguments as a JSON string, Ollama as an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentEncoding {
    String,
    Object,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub fn wire_messages(system: Option<&str>, messages: &[Message], encoding: ArgumentEncoding) -> Vec<Value> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(json!({ "role": "system", "content": system }));
    }

    let mut open_calls: HashSet<&str> = HashSet::new();
    for m in messages {
        match m.role {
            Role::Tool => {
                let paired = m
                    .tool_call_id
                    .as_deref()
                    .map(|id| open_calls.contains(id))
                    .unwrap_or(false);
                if paired {
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": m.tool_call_id,
                        "content": m.content.full_text(),
                    }));
                } else {
                    out.push(json!({
                        "role": "user",
                        "content": format!(
                            "Result of tool {}: {}",
                            m.name.as_deref().unwrap_or("unknown"),
                            m.content.full_text()
                        ),
                    }));
                }
            }
            Role::Assistant => {
                let calls: Vec<&ToolCall> = m
                    .tool_calls
                    .iter()
                    .filter(|c| answered.contains(c.id.as_str()))
                    .collect();
                let mut entry = json!({
                    "role": "assistant",
                    "content": m.content.full_text(),
                });
                if !calls.is_empty() {
                    entry["tool_calls"] = Value::Array(
                        calls
                            .iter()
                            .map(|c| {
                                open_calls.insert(c.id.as_str());
                                wire_tool_call(c, encoding)
                            })
                            .collect(),
                    );
                }
                out.push(entry);
            }
            role => out.push(json!({
                "role": role_name(role),
                "content": m.content.full_text(),
            })),
        }
    }
    out
}

fn wire_tool_call(call: &ToolCall, encoding: ArgumentEncoding) -> Value {
    let arguments = match encoding {
        ArgumentEncoding::String => Value::String(call.arguments.to_string()),
        ArgumentEncoding::Object => call.arguments.clone(),
    };
    json!({
        "id": call.id,
        "type": "function",
        "function": { "name": call.name, "arguments": arguments },
    })
}

fn wire_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

/// Convert a provider reply message into an assistant [`Message`].
pub fn parse_reply(message: &Value) -> Message {
    let content = Content::from_value(message.get("content").unwrap_or(&Value::Null));

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, call)| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = match function.get("arguments") {
                        Some(Value::String(raw)) => {
                            serde_json::from_str(raw).unwrap_or_else(|_| json!({ "_raw": raw }))
                        }
                        Some(other) => other.clone(),
                        None => json!({}),
                    };
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("call_{}_{}", i, uuid::Uuid::new_v4().simple()));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Message::assistant_with_tools(content, tool_calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "retrieve_repo_graph".into(),
            arguments: json!({}),
        }
    }

    #[test]
    fn test_parse_openai_tool_call() {
        let reply = json!({
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "search_web", "arguments": "{\"search_terms\": \"rust\"}"}
            }]
        });
        let msg = parse_reply(&reply);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "call_1");
        assert_eq!(msg.tool_calls[0].arguments["search_terms"], "rust");
    }

    #[test]
    fn test_parse_ollama_reply_generates_ids() {
        let reply = json!({
            "content": "",
            "tool_calls": [{"function": {"name": "retrieve_repo_graph", "arguments": {}}}]
        });
        let msg = parse_reply(&reply);
        assert!(msg.tool_calls[0].id.starts_with("call_0_"));
    }

    #[test]
    fn test_parse_plain_answer() {
        let msg = parse_reply(&json!({"content": "hello"}));
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.content.answer_text(), "hello");
    }

    #[test]
    fn test_orphan_tool_result_sent_as_user() {
        let orphan = Message::tool_result(&call("gone"), "stale result");
        let wire = wire_messages(Some("sys"), &[orphan], ArgumentEncoding::String);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
        assert!(wire[1]["content"].as_str().unwrap().contains("stale result"));
    }

    #[test]
    fn test_paired_calls_kept_and_unanswered_dropped() {
        let answered = call("a");
        let unanswered = call("b");
        let history = vec![
            Message::user("q"),
            Message::assistant_with_tools("", vec![answered.clone(), unanswered]),
            Message::tool_result(&answered, "ok"),
        ];
        let wire = wire_messages(None, &history, ArgumentEncoding::String);
        let calls = wire[1]["tool_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["id"], "a");
        assert!(calls[0]["function"]["arguments"].is_string());
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "a");
    }

    #[test]
    fn test_object_argument_encoding() {
        let c = call("x");
        let history = vec![
            Message::assistant_with_tools("", vec![c.clone()]),
            Message::tool_result(&c, "done"),
        ];
        let wire = wire_messages(None, &history, ArgumentEncoding::Object);
        assert!(wire[0]["tool_calls"][0]["function"]["arguments"].is_object());
    }
}
