//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing the same
//! `/chat/completions`, `/audio/transcriptions` and `/audio/speech` API.
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Forced tool choice (`tool_choice: {"type": "function", ...}`)
//! - Speech-to-text and text-to-speech

use async_trait::async_trait;
use jarvis_config::SpeechConfig;
use jarvis_core::error::{ProviderError, SpeechError};
use jarvis_core::message::{Message, MessageToolCall, Role};
use jarvis_core::provider::*;
use jarvis_core::speech::SpeechProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    speech: SpeechConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            speech: SpeechConfig::default(),
            client,
        })
    }

    /// Override the speech models, voice and language.
    pub fn with_speech(mut self, speech: SpeechConfig) -> Self {
        self.speech = speech;
        self
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn to_api_tool_choice(choice: &ToolChoice) -> serde_json::Value {
        match choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::Forced(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }

    /// Build the `/chat/completions` JSON body.
    ///
    /// `tools` and `tool_choice` are only sent together; a request with no
    /// catalog carries no tool choice.
    fn build_chat_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = Self::to_api_tool_choice(&request.tool_choice);
        }

        body
    }

    /// Map non-success HTTP statuses to provider errors.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl jarvis_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_chat_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tool_choice = %request.tool_choice,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        parse_chat_response(api_response)
    }
}

#[async_trait]
impl SpeechProvider for OpenAiCompatProvider {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, SpeechError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        info!(size = audio.len(), model = %self.speech.transcription_model, "Transcribing audio");

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| SpeechError::Transcription(format!("failed to build upload: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.speech.transcription_model.clone())
            .text("language", self.speech.language.clone())
            .text("response_format", "json")
            .part("file", part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;

        let response = Self::check_status(response)
            .await
            .map_err(|e| SpeechError::Transcription(e.to_string()))?;

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Transcription(format!("Failed to parse response: {e}")))?;

        debug!(text = %body.text, "Transcription complete");
        Ok(body.text)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/audio/speech", self.base_url);
        info!(chars = text.chars().count(), voice = %self.speech.voice, "Synthesizing speech");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.speech.tts_model,
                "voice": self.speech.voice,
                "input": text,
                "speed": self.speech.speed,
                "response_format": "mp3",
            }))
            .send()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let response = Self::check_status(response)
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::Synthesis(format!("Failed to read audio: {e}")))?;

        debug!(size = bytes.len(), "Speech synthesized");
        Ok(bytes.to_vec())
    }
}

/// Turn the first choice of a chat response into our domain response.
fn parse_chat_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    let tool_calls: Vec<MessageToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| MessageToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let mut message = Message::assistant(choice.message.content.unwrap_or_default());
    message.tool_calls = tool_calls;

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        message,
        usage,
        model: api_response.model,
    })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}
