//! Model backends that stream a dataset as text deltas.
//!
//! [`DatasetModel`] decouples the pipeline from Gemini so tests can script the
//! stream through [`MockHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use gemini_rust::{Gemini, GenerationConfig, Message};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    error::{DatasetError, Result},
    stream::TextStream,
};

/// Handler used to short-circuit model requests during tests.
///
/// It receives the composed prompt and schema and returns the chunks to stream.
pub type MockHandler = Arc<dyn Fn(MockRequest) -> Result<Vec<String>> + Send + Sync>;

/// Minimal view of a model request passed to [`MockHandler`].
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// The composed instruction.
    pub prompt: String,
    /// The dataset envelope schema used as the structured-output constraint.
    pub response_schema: Value,
}

/// Opens an incremental response for a prompt constrained by a JSON Schema.
#[async_trait]
pub trait DatasetModel: Send + Sync {
    async fn stream_dataset(&self, prompt: &str, response_schema: &Value) -> Result<TextStream>;
}

/// Streams from Gemini with the schema applied via the generation config.
#[derive(Clone)]
pub struct GeminiDatasetModel {
    client: Arc<Gemini>,
    temperature: f32,
}

impl GeminiDatasetModel {
    pub fn new(client: Arc<Gemini>, temperature: f32) -> Self {
        Self {
            client,
            temperature,
        }
    }
}

#[async_trait]
impl DatasetModel for GeminiDatasetModel {
    async fn stream_dataset(&self, prompt: &str, response_schema: &Value) -> Result<TextStream> {
        let schema_json = serde_json::to_string_pretty(response_schema)
            .unwrap_or_else(|_| "Unable to serialize schema".to_string());
        info!("Applying response schema via generation config:\n{schema_json}");

        let config = GenerationConfig {
            response_schema: Some(response_schema.clone()),
            response_mime_type: Some("application/json".to_string()),
            temperature: Some(self.temperature),
            ..Default::default()
        };

        let inner = self
            .client
            .generate_content()
            .with_message(Message::user(prompt.to_string()))
            .with_generation_config(config)
            .execute_stream()
            .await?;
        debug!("Model stream opened");

        Ok(Box::pin(inner.map(|resp| {
            resp.map(|response| response.text())
                .map_err(DatasetError::Gemini)
        })))
    }
}

/// Replays whatever the mock handler returns as a chunked stream.
#[derive(Clone)]
pub struct MockDatasetModel {
    handler: MockHandler,
}

impl MockDatasetModel {
    pub fn new(handler: MockHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl DatasetModel for MockDatasetModel {
    async fn stream_dataset(&self, prompt: &str, response_schema: &Value) -> Result<TextStream> {
        let request = MockRequest {
            prompt: prompt.to_string(),
            response_schema: response_schema.clone(),
        };
        let chunks = (self.handler)(request)?;
        debug!(chunks = chunks.len(), "Serving mock stream");
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}
