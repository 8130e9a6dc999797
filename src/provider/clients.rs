//! HTTP clients for the supported provider APIs.

use super::{
    build_provider_http_client, map_http_error, AiProvider, ConnectionCheck, GenerationRequest,
    GenerationResponse, ProviderConfig, ToolCall, ToolSpec,
};
use crate::error::{PipelineError, ProviderError};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Turn a non-2xx response into a classified provider error.
async fn error_for_status(response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ProviderError::from_status(status, &error_text)
}

// OpenAI-compatible chat completions

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

fn openai_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

/// Client for OpenAI and any server speaking its chat completions API (Ollama included).
pub struct OpenAiClient {
    name: String,
    client: Client,
    config: ProviderConfig,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        name: &str,
        config: ProviderConfig,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, PipelineError> {
        let client = build_provider_http_client()?;
        Ok(Self {
            name: name.to_string(),
            client,
            config,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let model = self.config.model_for(request.model_tier).to_string();
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(OpenAIMessage {
                role: "system",
                content: request.system_prompt,
            });
        }
        messages.push(OpenAIMessage {
            role: "user",
            content: request.user_prompt,
        });

        let body = ChatCompletionRequest {
            model: model.clone(),
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            tools: request.tools.iter().map(openai_tool).collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %model, "Sending chat completion request");
        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
                name: call.function.name,
            })
            .collect();

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(GenerationResponse {
            text,
            model: if completion.model.is_empty() {
                model
            } else {
                completion.model
            },
            tokens_used: completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            tool_calls,
        })
    }

    async fn validate_connection(&self) -> ConnectionCheck {
        let started = Instant::now();
        let url = format!("{}/models", self.base_url);
        let result = self.authorize(self.client.get(&url)).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => ConnectionCheck {
                success: true,
                latency_ms: Some(latency_ms),
                message: None,
            },
            Ok(response) => ConnectionCheck {
                success: false,
                latency_ms: Some(latency_ms),
                message: Some(error_for_status(response).await.to_string()),
            },
            Err(e) => ConnectionCheck {
                success: false,
                latency_ms: None,
                message: Some(map_http_error(e).to_string()),
            },
        }
    }
}

// Anthropic messages API

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    model: String,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

pub struct AnthropicClient {
    name: String,
    client: Client,
    config: ProviderConfig,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(name: &str, config: ProviderConfig, api_key: String) -> Result<Self, PipelineError> {
        let client = build_provider_http_client()?;
        Ok(Self {
            name: name.to_string(),
            client,
            config,
            api_key,
        })
    }

    fn url(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| ANTHROPIC_URL.to_string())
    }

    async fn post(&self, body: &Value) -> Result<Response, ProviderError> {
        self.client
            .post(self.url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(map_http_error)
    }
}

#[async_trait]
impl AiProvider for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let model = self.config.model_for(request.model_tier).to_string();
        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": [{"role": "user", "content": request.user_prompt}],
        });
        if !request.system_prompt.is_empty() {
            body["system"] = json!(request.system_prompt);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request
                .tools
                .iter()
                .map(|tool| json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters,
                }))
                .collect::<Vec<_>>());
        }

        debug!(provider = %self.name, model = %model, "Sending messages request");
        let response = self.post(&body).await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("Failed to parse response: {}", e)))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicContent::Text { text: chunk } => text.push_str(&chunk),
                AnthropicContent::ToolUse { name, input } => tool_calls.push(ToolCall {
                    name,
                    arguments: input,
                }),
                AnthropicContent::Unknown => {}
            }
        }
        if text.trim().is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(GenerationResponse {
            text,
            model: if parsed.model.is_empty() {
                model
            } else {
                parsed.model
            },
            tokens_used: parsed
                .usage
                .map(|u| u.input_tokens + u.output_tokens)
                .unwrap_or(0),
            tool_calls,
        })
    }

    /// Anthropic has no cheap listing endpoint here, so send a one-token request.
    async fn validate_connection(&self) -> ConnectionCheck {
        let body = json!({
            "model": self.config.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        let started = Instant::now();
        let result = self.post(&body).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => ConnectionCheck {
                success: true,
                latency_ms: Some(latency_ms),
                message: None,
            },
            Ok(response) => ConnectionCheck {
                success: false,
                latency_ms: Some(latency_ms),
                message: Some(error_for_status(response).await.to_string()),
            },
            Err(e) => ConnectionCheck {
                success: false,
                latency_ms: None,
                message: Some(e.to_string()),
            },
        }
    }
}
