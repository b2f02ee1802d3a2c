//! OpenAI-compatible model provider.
//!
//! This is the one concrete provider shipped with the runtime — it proves
//! the `LlmProvider` trait is implementable end-to-end (request building,
//! tool-call translation, streaming, usage accounting) without committing
//! to a specific vendor: any server speaking the `/chat/completions` wire
//! format (OpenAI itself, a local gguf server, OpenRouter, ...) works by
//! pointing `base_url` at it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, Secret};
use tokio_stream::Stream;
use tracing::{debug, trace, warn};

use crate::model::{CompletionResponse, LlmProvider, StreamEvent, ToolCall, Usage};

pub struct OpenAiProvider {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    provider_name: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: Secret<String>, model: String, base_url: String) -> Self {
        Self::new_with_name(api_key, model, base_url, "openai".into())
    }

    /// Construct under a different display name — used when `base_url`
    /// points at a non-OpenAI backend speaking the same wire format.
    pub fn new_with_name(api_key: Secret<String>, model: String, base_url: String, provider_name: String) -> Self {
        Self {
            api_key,
            model,
            base_url,
            provider_name,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

/// Translate flat tool schemas (`{name, description, parameters}`) into
/// OpenAI's function-calling wrapper.
fn to_openai_tools(tools: &[serde_json::Value]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": t["name"],
                    "description": t["description"],
                    "parameters": t["parameters"],
                }
            })
        })
        .collect()
}

/// Extract `ToolCall`s from a non-streaming response message.
fn parse_tool_calls(message: &serde_json::Value) -> Vec<ToolCall> {
    message["tool_calls"]
        .as_array()
        .map(|tcs| {
            tcs.iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments = serde_json::from_str(args_str).unwrap_or_else(|_| serde_json::json!({}));
                    Some(ToolCall { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn id(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn context_window(&self) -> u32 {
        super::context_window_for_model(&self.model)
    }

    async fn complete(&self, messages: &[serde_json::Value], tools: &[serde_json::Value]) -> anyhow::Result<CompletionResponse> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(to_openai_tools(tools));
        }

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "provider call");

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", self.auth_header())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, body = %text, provider = %self.provider_name, "provider returned an error");
            anyhow::bail!("{} API error HTTP {status}: {text}", self.provider_name);
        }

        let body: serde_json::Value = resp.json().await?;
        trace!(response = %body, "provider raw response");

        let message = &body["choices"][0]["message"];
        let text = message["content"].as_str().map(str::to_string);
        let tool_calls = parse_tool_calls(message);
        let usage = Usage {
            input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(CompletionResponse { text, tool_calls, usage })
    }

    fn stream(&self, messages: Vec<serde_json::Value>) -> Pin<Box<dyn Stream<Item = StreamEvent> + Send + '_>> {
        Box::pin(async_stream::stream! {
            let body = serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
                "stream_options": { "include_usage": true },
            });

            let resp = match self
                .client
                .post(self.endpoint())
                .header("Authorization", self.auth_header())
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    let status = r.status();
                    let text = r.text().await.unwrap_or_default();
                    yield StreamEvent::Error(format!("HTTP {status}: {text}"));
                    return;
                },
                Err(e) => {
                    yield StreamEvent::Error(e.to_string());
                    return;
                },
            };

            let mut byte_stream = resp.bytes_stream();
            let mut buf = String::new();
            let mut usage = Usage { input_tokens: 0, output_tokens: 0 };

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield StreamEvent::Error(e.to_string());
                        return;
                    },
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf = buf[pos + 1..].to_string();
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data == "[DONE]" {
                        yield StreamEvent::Done(usage);
                        return;
                    }
                    let Ok(evt) = serde_json::from_str::<serde_json::Value>(data) else { continue };
                    if let Some(u) = evt.get("usage").filter(|u| !u.is_null()) {
                        usage.input_tokens = u["prompt_tokens"].as_u64().unwrap_or(0) as u32;
                        usage.output_tokens = u["completion_tokens"].as_u64().unwrap_or(0) as u32;
                    }
                    if let Some(delta) = evt["choices"][0]["delta"]["content"].as_str()
                        && !delta.is_empty()
                    {
                        yield StreamEvent::Delta(delta.to_string());
                    }
                }
            }
        })
    }
}
