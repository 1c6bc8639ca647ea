use std::sync::Arc;

use chrono::Utc;
use gemini_rust::{Gemini, Model};
use tracing::{debug, info, instrument, warn};

use crate::{
    dataset::ParsedDataset,
    error::{DatasetError, Result},
    image::{ImageGenerator, PlaceholderImageGenerator},
    model::{DatasetModel, GeminiDatasetModel, MockDatasetModel, MockHandler, MockRequest},
    models::GenerationOutcome,
    output::{OutputSink, RunGuard, RunTracker},
    postprocess::enrich_images,
    prompt::compose_prompt,
    request::GenerationRequest,
    stream::consume_stream,
};

/// Global configuration options for the client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Sampling temperature for the dataset request (default: 0.7)
    pub temperature: f32,
    /// Strip Markdown fences before parsing the accumulated text (default: true)
    pub strip_markdown_fences: bool,
    /// Log schema mismatches in the parsed dataset. Never rejects. (default: true)
    pub validate_output: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            strip_markdown_fences: true,
            validate_output: true,
        }
    }
}

/// Builder for [`DatasetClient`].
pub struct DatasetClientBuilder {
    api_key: String,
    model: Model,
    config: ClientConfig,
    backend: Option<Arc<dyn DatasetModel>>,
    image_generator: Option<Arc<dyn ImageGenerator>>,
    mock_handler: Option<MockHandler>,
}

impl DatasetClientBuilder {
    /// The key is only held in memory for the lifetime of the client.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Model::Gemini25Flash,
            config: ClientConfig::default(),
            backend: None,
            image_generator: None,
            mock_handler: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Apply a complete client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom image backend instead of [`PlaceholderImageGenerator`].
    pub fn with_image_generator(mut self, generator: impl ImageGenerator + 'static) -> Self {
        self.image_generator = Some(Arc::new(generator));
        self
    }

    /// Use a custom model backend instead of Gemini.
    pub fn with_model_backend(mut self, backend: impl DatasetModel + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Provide a mock handler to intercept all model requests.
    ///
    /// The handler returns the chunks to stream, so no network calls are made.
    pub fn with_mock(
        mut self,
        handler: impl Fn(MockRequest) -> Result<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        self.mock_handler = Some(Arc::new(handler));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<DatasetClient> {
        let model: Arc<dyn DatasetModel> = match (self.mock_handler, self.backend) {
            (Some(handler), _) => Arc::new(MockDatasetModel::new(handler)),
            (None, Some(backend)) => backend,
            (None, None) => {
                if self.api_key.trim().is_empty() {
                    return Err(DatasetError::Config("API key must not be empty".to_string()));
                }
                let gemini = Arc::new(Gemini::with_model(&self.api_key, self.model.clone())?);
                Arc::new(GeminiDatasetModel::new(gemini, self.config.temperature))
            }
        };

        let images = self
            .image_generator
            .unwrap_or_else(|| Arc::new(PlaceholderImageGenerator::default()));

        Ok(DatasetClient {
            model,
            images,
            config: self.config,
            runs: RunTracker::new(),
        })
    }
}

/// Runs the two-pass pipeline: stream the dataset, then resolve image fields.
///
/// Clones share the same [`RunTracker`], so starting a run on any clone supersedes
/// runs on the others.
#[derive(Clone)]
pub struct DatasetClient {
    model: Arc<dyn DatasetModel>,
    images: Arc<dyn ImageGenerator>,
    config: ClientConfig,
    runs: RunTracker,
}

impl DatasetClient {
    /// Get the current client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Tracker that decides which run may still publish.
    pub fn runs(&self) -> &RunTracker {
        &self.runs
    }

    /// Start a new run, superseding any run still in flight.
    pub fn begin_run(&self) -> RunGuard {
        self.runs.begin()
    }

    /// Generate a dataset for `request`, publishing progress to `sink`.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        sink: &dyn OutputSink,
    ) -> Result<GenerationOutcome> {
        let guard = self.begin_run();
        self.run(request, &guard, sink).await
    }

    /// Execute a run that was started with [`begin_run`](Self::begin_run).
    #[instrument(skip_all, fields(run_id = guard.id(), concept = %request.concept_name))]
    pub async fn run(
        &self,
        request: &GenerationRequest,
        guard: &RunGuard,
        sink: &dyn OutputSink,
    ) -> Result<GenerationOutcome> {
        let started_at = Utc::now();
        request.validate()?;
        let schema = request.schema()?;
        let prompt = compose_prompt(request)?;
        info!(
            fields = request.fields.len(),
            image_fields = request.image_fields().count(),
            "Starting dataset generation"
        );

        let stream = self
            .model
            .stream_dataset(&prompt, schema.envelope())
            .await?;
        let buffer = consume_stream(stream, guard, sink).await?;
        guard.ensure_current()?;
        let chunk_count = buffer.chunk_count();
        let raw_text = buffer.finish();

        let mut dataset = if self.config.strip_markdown_fences {
            ParsedDataset::parse_lenient(&request.concept_name, &raw_text)?
        } else {
            ParsedDataset::parse(&request.concept_name, &raw_text)?
        };
        debug!(records = dataset.len(), "Parsed dataset");

        if self.config.validate_output {
            match schema.validation_issues(dataset.as_value()) {
                Ok(Some(issues)) => warn!(issues = %issues, "Dataset does not match schema"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping dataset validation"),
            }
        }

        let image_calls =
            enrich_images(&mut dataset, &request.fields, self.images.as_ref(), guard, sink)
                .await?;
        guard.ensure_current()?;

        info!(
            records = dataset.len(),
            chunks = chunk_count,
            image_calls,
            "Dataset generation complete"
        );

        Ok(GenerationOutcome {
            run_id: guard.id(),
            dataset: dataset.into_value(),
            raw_text,
            chunk_count,
            image_calls,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
