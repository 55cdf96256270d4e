use async_stream::stream;
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{AgentClient, ClientError, EventStream, FinishReason, StreamEvent, ToolCallRequest, Usage};
use crate::config::{API_KEY_ENV, Config};
use crate::session::{ChatHistory, Message};

/// Streaming response chunk.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    #[serde(default)]
    function: ChunkFunctionCall,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    stream: bool,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental decoder turning server-sent-event bytes into [`StreamEvent`]s.
///
/// Lines may be split across network chunks, including in the middle of a
/// UTF-8 sequence; only complete lines are decoded. Tool call fragments are
/// accumulated by index and emitted once the choice reports a finish reason.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, PendingToolCall>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds raw bytes and returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.done {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut events);
        }
        events
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Failed to parse chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            events.push(StreamEvent::Error {
                message: error.message,
            });
            return;
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    events.push(StreamEvent::Content(text));
                }
            }

            for call in choice.delta.tool_calls.into_iter().flatten() {
                let pending = self.tool_calls.entry(call.index).or_default();
                if let Some(id) = call.id {
                    pending.id = id;
                }
                if let Some(name) = call.function.name {
                    pending.name.push_str(&name);
                }
                if let Some(arguments) = call.function.arguments {
                    pending.arguments.push_str(&arguments);
                }
            }

            if let Some(reason) = choice.finish_reason {
                for (_, call) in std::mem::take(&mut self.tool_calls) {
                    let args = if call.arguments.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        match serde_json::from_str(&call.arguments) {
                            Ok(args) => args,
                            Err(e) => {
                                debug!(tool = %call.name, error = %e, "Failed to parse tool call arguments");
                                serde_json::json!({})
                            }
                        }
                    };
                    events.push(StreamEvent::ToolCallRequest(ToolCallRequest {
                        call_id: call.id,
                        name: call.name,
                        args,
                    }));
                }
                events.push(StreamEvent::Finished(FinishReason::from_wire(&reason)));
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }));
        }
    }
}

/// An [`AgentClient`] for the Gemini API's OpenAI-compatible chat endpoint.
///
/// Keeps the conversation history so consecutive messages form one chat.
/// A user turn and its reply are committed together once the response
/// finishes; failed, cancelled or unfinished exchanges leave the history
/// untouched. Concurrent exchanges each send the history as it stood when
/// they started and commit in the order they finish.
#[derive(Debug)]
pub struct GeminiChatClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    timeout: Option<Duration>,
    http: OnceLock<Client>,
    history: ChatHistory,
}

impl GeminiChatClient {
    /// Creates an uninitialized client.
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key,
            base_url: base_url.into(),
            timeout,
            http: OnceLock::new(),
            history: ChatHistory::new(),
        }
    }

    /// Creates an uninitialized client from an agent configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.model(),
            config.api_key().map(str::to_string),
            config.base_url(),
            config.timeout(),
        )
    }

    /// The conversation so far.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    fn build_http_client(&self) -> Result<Client, ClientError> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| ClientError::Auth(format!("{} not set", API_KEY_ENV)))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| ClientError::Auth("API key is not a valid header value".to_string()))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(client_builder.build()?)
    }

    fn build_messages(history: &[Message]) -> Vec<Value> {
        history
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })
            })
            .collect()
    }
}

fn status_error(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited(body),
        _ => ClientError::Api(format!("{}: {}", status, body)),
    }
}

#[async_trait]
impl AgentClient for GeminiChatClient {
    fn is_initialized(&self) -> bool {
        self.http.get().is_some()
    }

    async fn initialize(&self) -> Result<(), ClientError> {
        if self.is_initialized() {
            return Ok(());
        }
        let client = self.build_http_client()?;
        let _ = self.http.set(client);
        debug!(model = %self.model, base_url = %self.base_url, "Gemini client initialized");
        Ok(())
    }

    async fn send_message_stream(
        &self,
        message: &str,
        cancel: CancellationToken,
        prompt_id: &str,
    ) -> Result<EventStream, ClientError> {
        let client = self.http.get().cloned().ok_or(ClientError::NotInitialized)?;

        let user = Message::new_user(message);
        let mut messages = self.history.snapshot().await;
        messages.push(user.clone());
        let body = ChatRequest {
            model: self.model.clone(),
            messages: Self::build_messages(&messages),
            stream: true,
        };

        debug!(model = %self.model, prompt_id, "Starting streaming request");

        let request = client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Aborted),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(status_error(status, error_text));
        }

        let mut bytes = response.bytes_stream();
        let history = self.history.clone();

        let s = stream! {
            let mut decoder = SseDecoder::new();
            let mut reply = String::new();
            let mut user = Some(user);

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = bytes.next() => Some(chunk),
                };
                let chunk = match next {
                    Some(Some(Ok(c))) => c,
                    Some(Some(Err(e))) => {
                        yield Err(ClientError::Network(e));
                        return;
                    }
                    Some(None) => break,
                    None => {
                        yield Err(ClientError::Aborted);
                        return;
                    }
                };

                for event in decoder.push(&chunk) {
                    match &event {
                        StreamEvent::Content(text) => reply.push_str(text),
                        StreamEvent::Finished(_) => {
                            if let Some(user) = user.take() {
                                let assistant = Message::new_assistant(std::mem::take(&mut reply));
                                history.push_turn(user, assistant).await;
                            }
                        }
                        _ => {}
                    }
                    yield Ok(event);
                }

                if decoder.is_done() {
                    break;
                }
            }
        };

        Ok(Box::pin(s))
    }
}
