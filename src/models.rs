use chrono::{DateTime, Utc};
use serde_json::Value;

/// Result of a completed generation run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: u64,
    /// Final dataset after image enrichment.
    pub dataset: Value,
    /// Text exactly as accumulated from the stream.
    pub raw_text: String,
    /// Number of non-empty stream deltas received.
    pub chunk_count: usize,
    /// Number of image generation calls made.
    pub image_calls: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl GenerationOutcome {
    /// Records in the dataset under `concept`.
    pub fn records(&self, concept: &str) -> &[Value] {
        self.dataset
            .get(concept)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Pretty-printed dataset, as shown in the output pane.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.dataset).unwrap_or_else(|_| self.raw_text.clone())
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
