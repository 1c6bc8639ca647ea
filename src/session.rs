use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
    client::DatasetClient,
    error::{DatasetError, Result},
    field::FieldSpec,
    models::GenerationOutcome,
    output::{OutputBuffer, OutputSink, Phase},
    request::GenerationRequest,
};

/// Where the most recent run stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Streaming,
    Enriching,
    Complete,
    Failed(String),
}

/// Shared view of a session's run status.
///
/// [`FormSession::generate`] holds the session mutably for the whole run, so
/// observers keep a clone of this handle instead.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<RunStatus>>,
}

impl StatusHandle {
    pub fn get(&self) -> RunStatus {
        self.inner.lock().unwrap().clone()
    }

    fn set(&self, status: RunStatus) {
        *self.inner.lock().unwrap() = status;
    }

    /// Move to `to` only while the status is still `from`.
    fn advance(&self, from: &RunStatus, to: RunStatus) {
        let mut status = self.inner.lock().unwrap();
        if *status == *from {
            *status = to;
        }
    }
}

/// Form state for one user: the dataset description plus the live output pane.
pub struct FormSession {
    pub concept_name: String,
    pub extra_info: String,
    fields: Vec<FieldSpec>,
    output: OutputBuffer,
    status: StatusHandle,
    last_outcome: Option<GenerationOutcome>,
}

impl Default for FormSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FormSession {
    /// A fresh form with the single default `id` field.
    pub fn new() -> Self {
        Self {
            concept_name: String::new(),
            extra_info: String::new(),
            fields: vec![FieldSpec::default_id()],
            output: OutputBuffer::new(),
            status: StatusHandle::default(),
            last_outcome: None,
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Append an empty text field and return its index.
    pub fn add_field(&mut self) -> usize {
        self.fields.push(FieldSpec::text(""));
        self.fields.len() - 1
    }

    /// Replace the field at `index`.
    pub fn update_field(&mut self, index: usize, field: FieldSpec) -> Result<()> {
        let slot = self.fields.get_mut(index).ok_or_else(|| {
            DatasetError::Context(format!("no field at index {index}"))
        })?;
        *slot = field;
        Ok(())
    }

    pub fn remove_field(&mut self, index: usize) -> Result<FieldSpec> {
        if index >= self.fields.len() {
            return Err(DatasetError::Context(format!("no field at index {index}")));
        }
        Ok(self.fields.remove(index))
    }

    /// Snapshot the form for a generation run.
    pub fn snapshot(&self) -> GenerationRequest {
        GenerationRequest::new(self.concept_name.clone(), self.fields.clone())
            .with_extra_info(self.extra_info.clone())
    }

    /// Handle to the output pane. Clones observe every publish.
    pub fn output(&self) -> OutputBuffer {
        self.output.clone()
    }

    /// Status of the latest run.
    pub fn status(&self) -> RunStatus {
        self.status.get()
    }

    /// Handle that follows the status while a run is in flight.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    fn set_status(&self, status: RunStatus) {
        self.status.set(status);
    }

    pub fn last_outcome(&self) -> Option<&GenerationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Run generation for the current form, replacing any previous output.
    ///
    /// Failures are recorded as [`RunStatus::Failed`] and also returned.
    pub async fn generate(&mut self, client: &DatasetClient) -> Result<&GenerationOutcome> {
        let request = self.snapshot();
        let guard = client.begin_run();

        self.output.claim(guard.id());
        self.last_outcome = None;
        self.set_status(RunStatus::Streaming);

        let sink = StatusTrackingSink {
            output: self.output.clone(),
            status: self.status.clone(),
        };
        let result = client.run(&request, &guard, &sink).await;

        match result {
            Ok(outcome) => {
                info!(run_id = outcome.run_id, "Run finished");
                self.set_status(RunStatus::Complete);
                Ok(&*self.last_outcome.insert(outcome))
            }
            Err(err) if err.is_superseded() => {
                warn!(run_id = guard.id(), "Run superseded");
                self.set_status(RunStatus::Idle);
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "Run failed");
                self.set_status(RunStatus::Failed(err.to_string()));
                Err(err)
            }
        }
    }
}

/// Forwards to the output pane and moves the status to `Enriching` when image
/// resolution starts.
struct StatusTrackingSink {
    output: OutputBuffer,
    status: StatusHandle,
}

impl OutputSink for StatusTrackingSink {
    fn publish(&self, phase: Phase, text: &str) {
        self.output.publish(phase, text);
    }

    fn publish_for_run(&self, run_id: u64, phase: Phase, text: &str) {
        self.output.publish_for_run(run_id, phase, text);
    }

    fn enter_phase(&self, phase: Phase) {
        if phase == Phase::Enriching {
            self.status.advance(&RunStatus::Streaming, RunStatus::Enriching);
        }
    }
}
