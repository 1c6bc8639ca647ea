use thiserror::Error;

/// Errors raised while building, streaming or enriching a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Gemini client error: {0}")]
    Gemini(#[from] gemini_rust::ClientError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed model response: {message}\n\nRaw response:\n{raw_text}\n\nSuggestion: {suggestion}")]
    MalformedResponse {
        message: String,
        raw_text: String,
        suggestion: String,
    },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Image generation failed for field '{field}': {message}")]
    ImageGeneration { field: String, message: String },

    /// A newer run was started before this one finished.
    ///
    /// Stale runs stop at their next checkpoint and never publish again.
    #[error("Run {run_id} was superseded by a newer run")]
    Superseded { run_id: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Context error: {0}")]
    Context(String),
}

impl DatasetError {
    /// Create a malformed-response error with helpful context.
    pub fn parse_error(err: serde_json::Error, raw_text: &str) -> Self {
        let suggestion = Self::suggest_parse_fix(&err, raw_text);
        Self::MalformedResponse {
            message: err.to_string(),
            raw_text: Self::truncate_for_display(raw_text, 500),
            suggestion,
        }
    }

    /// Create a malformed-response error for JSON that parsed but has the wrong shape.
    pub fn shape_error(message: impl Into<String>, raw_text: &str) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            raw_text: Self::truncate_for_display(raw_text, 500),
            suggestion: "The response must be an object holding an array of records under \
                         the concept name. Check that the concept name is a plain key."
                .to_string(),
        }
    }

    /// Create an image generation error.
    pub fn image_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageGeneration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error only means a newer run took over.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }

    /// Check if the upstream service reported a transient condition.
    ///
    /// Nothing in this crate retries; callers may use this to word their message.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Gemini(gemini_rust::ClientError::BadResponse { code, .. }) => {
                *code == 503 || *code == 429
            }
            _ => false,
        }
    }

    fn suggest_parse_fix(err: &serde_json::Error, raw_text: &str) -> String {
        let err_msg = err.to_string().to_lowercase();

        if raw_text.trim().is_empty() {
            return "The model returned an empty response. Try adding more context \
                    to the extra information."
                .to_string();
        }

        if !raw_text.trim().starts_with(['{', '[']) {
            return "The model returned non-JSON text. Check that the model supports \
                    structured output."
                .to_string();
        }

        if err_msg.contains("eof while parsing") {
            return "The response ended mid-document. The stream was probably cut short; \
                    generate again or request fewer records."
                .to_string();
        }

        "Check that the field names and concept name are plain identifiers the model \
         can reproduce verbatim."
            .to_string()
    }

    fn truncate_for_display(text: &str, max_len: usize) -> String {
        if text.len() <= max_len {
            text.to_string()
        } else {
            let mut cut = max_len;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}... [truncated, {} total chars]", &text[..cut], text.len())
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<DatasetError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            DatasetError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}
