use crate::error::{LlmError, Result};
use crate::thinking::split_thinking;
use crate::types::{
    ChatMessage, ChatResponse, Role, ToolCall, ToolDefinition, Usage, synthesize_call_id,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub(crate) const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client for Ollama's native `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    think: bool,
}

impl OllamaClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        model: &str,
        temperature: Option<f32>,
        think: bool,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            think,
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let req = OllamaChatRequest {
            model: self.model.clone(),
            messages: to_ollama_messages(messages),
            tools: tools.iter().map(to_ollama_tool).collect(),
            stream: false,
            think: self.think.then_some(true),
            options: self.temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "ollama chat status={status} body={body}"
            )));
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body)?;
        Ok(parsed.into())
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: String,
    function: OllamaToolFunction,
}

#[derive(Debug, Serialize)]
struct OllamaToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

fn to_ollama_tool(t: &ToolDefinition) -> OllamaTool {
    OllamaTool {
        r#type: "function".to_string(),
        function: OllamaToolFunction {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        },
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaOutgoingToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOutgoingToolCall {
    function: OllamaOutgoingFunction,
}

#[derive(Debug, Serialize)]
struct OllamaOutgoingFunction {
    name: String,
    arguments: serde_json::Value,
}

/// Ollama correlates tool results by tool name rather than call id, so the
/// name is recovered from the assistant message that issued the call.
fn to_ollama_messages(messages: &[ChatMessage]) -> Vec<OllamaMessage> {
    let mut names_by_call_id: HashMap<&str, &str> = HashMap::new();
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        for tc in &m.tool_calls {
            names_by_call_id.insert(tc.id.as_str(), tc.name.as_str());
        }
        let role = match m.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let tool_name = m
            .tool_call_id
            .as_deref()
            .and_then(|id| names_by_call_id.get(id))
            .map(|name| name.to_string());
        out.push(OllamaMessage {
            role: role.to_string(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| OllamaOutgoingToolCall {
                    function: OllamaOutgoingFunction {
                        name: tc.name.clone(),
                        arguments: serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    },
                })
                .collect(),
            tool_name,
        });
    }
    out
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OllamaResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OllamaResponseFunction,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl From<OllamaChatResponse> for ChatResponse {
    fn from(v: OllamaChatResponse) -> Self {
        let tool_calls = v
            .message
            .tool_calls
            .into_iter()
            .map(|tc| {
                let arguments = match tc.function.arguments {
                    serde_json::Value::Null => "{}".to_string(),
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                ToolCall {
                    id: tc
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(synthesize_call_id),
                    name: tc.function.name,
                    arguments,
                }
            })
            .collect();

        let (content, inline_thinking) = split_thinking(&v.message.content);
        let thinking = v
            .message
            .thinking
            .filter(|s| !s.trim().is_empty())
            .or(inline_thinking);

        ChatResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content,
                tool_calls,
                tool_call_id: None,
            },
            usage: Usage {
                prompt_tokens: v.prompt_eval_count.unwrap_or(0),
                completion_tokens: v.eval_count.unwrap_or(0),
            },
            finish_reason: v.done_reason.unwrap_or_else(|| "unknown".to_string()),
            thinking,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn tool_results_carry_the_issuing_tool_name() {
        let messages = vec![
            ChatMessage {
                role: Role::Assistant,
                content: String::new(),
                tool_calls: vec![ToolCall {
                    id: "call_0".to_string(),
                    name: "get_tasks".to_string(),
                    arguments: "{}".to_string(),
                }],
                tool_call_id: None,
            },
            ChatMessage::tool_result("call_0", "[]"),
        ];
        let out = to_ollama_messages(&messages);
        assert_eq!(out[1].role, "tool");
        assert_eq!(out[1].tool_name.as_deref(), Some("get_tasks"));
        assert_eq!(out[0].tool_calls[0].function.arguments, json!({}));
    }

    #[test]
    fn object_arguments_become_json_strings() {
        let raw = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "thinking": "the user wants a task",
                "tool_calls": [
                    {"function": {"name": "propose_create_task", "arguments": {"title": "Buy milk"}}},
                    {"function": {"name": "get_tasks", "arguments": {}}}
                ]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 42,
            "eval_count": 7
        });
        let parsed: OllamaChatResponse = serde_json::from_value(raw).expect("parse response");
        let resp = ChatResponse::from(parsed);
        assert!(resp.message.tool_calls[0].id.starts_with("call_"));
        assert_ne!(resp.message.tool_calls[0].id, resp.message.tool_calls[1].id);
        let args: serde_json::Value =
            serde_json::from_str(&resp.message.tool_calls[0].arguments).expect("valid json");
        assert_eq!(args["title"], "Buy milk");
        assert_eq!(resp.thinking.as_deref(), Some("the user wants a task"));
        assert_eq!(resp.usage.prompt_tokens, 42);
    }

    #[tokio::test]
    async fn chat_sends_think_and_stream_flags() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "qwen3:8b",
                "stream": false,
                "think": true,
                "options": {"temperature": 0.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "<think>hm</think>Sure."},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(
            reqwest::Client::new(),
            &server.uri(),
            "qwen3:8b",
            Some(0.0),
            true,
        );
        let resp = client
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .expect("chat succeeds");
        assert_eq!(resp.message.content, "Sure.");
        assert_eq!(resp.thinking.as_deref(), Some("hm"));
    }
}
