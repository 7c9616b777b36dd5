//! Text-generation client.
//!
//! The gateway speaks a tiny frame protocol over a WebSocket: one `runModel`
//! request goes out, zero or more progress frames come back, then a terminal
//! frame carrying `result` (or `error`).

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::InferenceError;
use crate::logging;

/// One model call. `label` names the facet/feature/step for logs and test
/// routing; it is never sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub label: String,
    pub model: String,
    pub prompt: String,
    pub system: String,
    pub temperature: Option<f32>,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn run_model(&self, request: &ModelRequest) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct RunModelFrame<'a> {
    action: &'static str,
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// What a single inbound frame means for the exchange.
#[derive(Debug, PartialEq)]
enum FrameOutcome {
    Result(String),
    Pending,
}

fn interpret_frame(text: &str) -> Result<FrameOutcome, InferenceError> {
    let frame: ResponseFrame = serde_json::from_str(text)
        .map_err(|e| InferenceError::MalformedResponse(format!("{}: {}", e, truncate(text, 200))))?;

    match (frame.result, frame.error) {
        (Some(result), _) if !result.is_empty() => Ok(FrameOutcome::Result(result)),
        (_, Some(error)) if !error.is_empty() => Err(InferenceError::Backend(error)),
        // `message` marker frames and anything else without a payload
        _ => Ok(FrameOutcome::Pending),
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Dials the gateway once per request.
pub struct WebSocketBackend {
    uri: String,
    connect_timeout: Duration,
}

impl WebSocketBackend {
    pub fn new(uri: &str, connect_timeout: Duration) -> Self {
        Self {
            uri: uri.to_string(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl InferenceBackend for WebSocketBackend {
    async fn run_model(&self, request: &ModelRequest) -> Result<String, InferenceError> {
        let connect = tokio_tungstenite::connect_async(self.uri.as_str());
        let (mut stream, _) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| InferenceError::Transport(format!("connect timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| InferenceError::Transport(format!("connect: {}", e)))?;

        let frame = RunModelFrame {
            action: "runModel",
            model: &request.model,
            prompt: &request.prompt,
            system: &request.system,
            temperature: request.temperature,
        };
        let payload = serde_json::to_string(&frame)
            .map_err(|e| InferenceError::MalformedResponse(format!("encode request: {}", e)))?;

        stream
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| InferenceError::Transport(format!("send: {}", e)))?;

        while let Some(message) = stream.next().await {
            let message = message.map_err(|e| InferenceError::Transport(format!("read message: {}", e)))?;
            let outcome = match message {
                WsMessage::Text(text) => interpret_frame(text.as_str())?,
                WsMessage::Binary(bytes) => {
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|e| InferenceError::MalformedResponse(format!("binary frame: {}", e)))?;
                    interpret_frame(text)?
                }
                WsMessage::Close(_) => break,
                // tungstenite answers pings itself
                _ => FrameOutcome::Pending,
            };

            if let FrameOutcome::Result(result) = outcome {
                let _ = stream.close(None).await;
                return Ok(result);
            }
        }

        Err(InferenceError::Transport(
            "connection closed before a result frame arrived".to_string(),
        ))
    }
}

/// Thin logging wrapper around a backend. No retries at this layer.
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    pub async fn invoke(&self, request: &ModelRequest) -> Result<String, InferenceError> {
        logging::log_inference(Some(&request.label), &format!(
            "Invoking {} (prompt {} chars)", request.model, request.prompt.len()
        ));

        match self.backend.run_model(request).await {
            Ok(text) => {
                logging::log_inference(Some(&request.label), &format!(
                    "Got response, length: {}", text.len()
                ));
                Ok(text)
            }
            Err(e) => {
                logging::log_inference(Some(&request.label), &format!("Call failed: {}", e));
                Err(e)
            }
        }
    }
}
