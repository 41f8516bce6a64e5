use super::{
    ChatMessage, ChatRole, ContentBlock, ContentBlockDelta, LlmProvider, LlmRequest, LlmResponse,
    LlmStreamResponse, MessagePart, Usage,
};
use async_trait::async_trait;
use bytes::Bytes;
use fitcoach_common::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|msg| {
                let content = match &msg.content {
                    MessagePart::Text(text) => json!(text),
                    MessagePart::Parts(parts) => {
                        json!(parts.iter().map(convert_block).collect::<Vec<_>>())
                    }
                };
                json!({
                    "role": match msg.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "assistant",
                    },
                    "content": content
                })
            })
            .collect()
    }

    fn create_request_body(request: &LlmRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::convert_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
        });

        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        // An empty tool list means tool use is off for this call.
        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema
                    }))
                    .collect::<Vec<_>>()
            );
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "Anthropic API error: status={}, body={}",
                status.as_u16(),
                error_text
            )));
        }
        Ok(response)
    }
}

fn convert_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => json!({ "type": "text", "text": text }),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content
        }),
    }
}

fn parse_usage(value: &serde_json::Value) -> Option<Usage> {
    value.as_object().map(|u| Usage {
        input_tokens: u
            .get("input_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        output_tokens: u
            .get("output_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = Self::create_request_body(request, false);
        let response = self.post(&body).await?;

        let raw_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("invalid Anthropic response: {e}")))?;

        let content_blocks = raw_response["content"]
            .as_array()
            .ok_or_else(|| Error::Agent("Missing content".to_string()))?
            .iter()
            .filter_map(|block| {
                let type_ = block["type"].as_str().unwrap_or_default();
                match type_ {
                    "text" => Some(ContentBlock::Text {
                        text: block["text"].as_str().unwrap_or_default().to_string(),
                    }),
                    "tool_use" => Some(ContentBlock::ToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        input: block["input"].clone(),
                    }),
                    other => {
                        debug!("skipping unsupported content block type: {other}");
                        None
                    }
                }
            })
            .collect();

        Ok(LlmResponse {
            content: content_blocks,
            model: raw_response["model"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            usage: parse_usage(&raw_response["usage"]),
            stop_reason: raw_response["stop_reason"].as_str().map(str::to_string),
        })
    }

    async fn stream(
        &self,
        request: &LlmRequest,
    ) -> Result<BoxStream<'static, Result<LlmStreamResponse>>> {
        let body = Self::create_request_body(request, true);
        let response = self.post(&body).await?;

        let bytes = response.bytes_stream().boxed();
        let buffer = Vec::new();

        let s = stream::try_unfold(
            (bytes, buffer),
            |(mut bytes, mut buffer): (BoxStream<'static, reqwest::Result<Bytes>>, Vec<u8>)| async move {
                loop {
                    if let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                        let line_bytes: Vec<u8> = buffer.drain(0..=i).collect();
                        let line = String::from_utf8_lossy(&line_bytes).trim().to_string();

                        if let Some(data) = line.strip_prefix("data:") {
                            if let Ok(json) = serde_json::from_str::<serde_json::Value>(data.trim()) {
                                if let Some(event) = parse_anthropic_event(&json)? {
                                    return Ok(Some((event, (bytes, buffer))));
                                }
                            }
                        }
                        continue;
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => return Err(Error::Agent(format!("Network error: {e}"))),
                        None => return Ok(None),
                    }
                }
            },
        );

        Ok(Box::pin(s))
    }
}

/// Map one SSE `data:` payload to a stream event. `error` events end the stream.
fn parse_anthropic_event(json: &serde_json::Value) -> Result<Option<LlmStreamResponse>> {
    let type_ = json["type"].as_str().unwrap_or_default();
    let index = json["index"].as_u64().unwrap_or(0) as u32;
    let event = match type_ {
        "message_start" => Some(LlmStreamResponse::MessageStart {
            usage: parse_usage(&json["message"]["usage"]),
        }),
        "content_block_start" => {
            let block = &json["content_block"];
            match block["type"].as_str().unwrap_or_default() {
                "text" => Some(LlmStreamResponse::ContentBlockStart {
                    index,
                    content_block: ContentBlock::Text {
                        text: block["text"].as_str().unwrap_or_default().to_string(),
                    },
                }),
                "tool_use" => Some(LlmStreamResponse::ContentBlockStart {
                    index,
                    content_block: ContentBlock::ToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        input: json!({}),
                    },
                }),
                _ => None,
            }
        }
        "content_block_delta" => {
            let delta = &json["delta"];
            match delta["type"].as_str().unwrap_or_default() {
                "text_delta" => Some(LlmStreamResponse::ContentBlockDelta {
                    index,
                    delta: ContentBlockDelta::Text {
                        text: delta["text"].as_str().unwrap_or_default().to_string(),
                    },
                }),
                "input_json_delta" => Some(LlmStreamResponse::ContentBlockDelta {
                    index,
                    delta: ContentBlockDelta::ToolUse {
                        partial_json: delta["partial_json"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    },
                }),
                _ => None,
            }
        }
        "content_block_stop" => Some(LlmStreamResponse::ContentBlockStop { index }),
        "message_delta" => Some(LlmStreamResponse::MessageStop {
            stop_reason: json["delta"]["stop_reason"].as_str().map(str::to_string),
            usage: json["usage"]["output_tokens"].as_u64().map(|tokens| Usage {
                input_tokens: 0,
                output_tokens: tokens as u32,
            }),
        }),
        "ping" => Some(LlmStreamResponse::Ping),
        "error" => {
            let message = json["error"]["message"]
                .as_str()
                .unwrap_or("unknown stream error");
            return Err(Error::Agent(format!("Anthropic stream error: {message}")));
        }
        _ => None,
    };
    Ok(event)
}
