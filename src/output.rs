//! Output binding and run supersession.
//!
//! Every publish carries the full current text, never a delta. A [`RunGuard`]
//! gates publishes so that a run started later silences every earlier one.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use tracing::debug;

use crate::error::{DatasetError, Result};

/// Stage of the run that produced a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Raw model text accumulated so far.
    Streaming,
    /// Pretty-printed dataset after an image field was resolved.
    Enriching,
}

/// Receives the full output text after every change.
pub trait OutputSink: Send + Sync {
    fn publish(&self, phase: Phase, text: &str);

    /// Publish on behalf of run `run_id`.
    ///
    /// Sinks that remember runs drop writes from runs older than the newest one they
    /// have seen. The default forwards to [`publish`](Self::publish).
    fn publish_for_run(&self, run_id: u64, phase: Phase, text: &str) {
        let _ = run_id;
        self.publish(phase, text);
    }

    /// Called once when a run moves into `phase`, before its first publish there.
    fn enter_phase(&self, _phase: Phase) {}
}

impl<F> OutputSink for F
where
    F: Fn(Phase, &str) + Send + Sync,
{
    fn publish(&self, phase: Phase, text: &str) {
        self(phase, text)
    }
}

/// Sink that drops everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn publish(&self, _phase: Phase, _text: &str) {}
}

/// Shared in-memory output pane.
///
/// Cloning shares the same underlying text, so a reader can hold one clone while a
/// run publishes into another.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<OutputState>>,
}

#[derive(Default)]
struct OutputState {
    text: String,
    phase: Option<Phase>,
    publishes: usize,
    /// Newest run that claimed or wrote this pane.
    run_id: u64,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current text of the pane.
    pub fn snapshot(&self) -> String {
        self.inner.lock().unwrap().text.clone()
    }

    /// Phase of the last publish, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.inner.lock().unwrap().phase
    }

    /// Number of publishes since the last clear.
    pub fn publish_count(&self) -> usize {
        self.inner.lock().unwrap().publishes
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().reset();
    }

    /// Clear the pane and hand it to `run_id`. Later writes from older runs are dropped.
    ///
    /// Run ids are only ordered within one client's tracker, so claim the pane again
    /// before publishing runs from a different client into it.
    pub fn claim(&self, run_id: u64) {
        let mut state = self.inner.lock().unwrap();
        state.reset();
        state.run_id = run_id;
    }

    /// Newest run that claimed or wrote the pane (0 if none).
    pub fn run_id(&self) -> u64 {
        self.inner.lock().unwrap().run_id
    }
}

impl OutputState {
    fn reset(&mut self) {
        self.text.clear();
        self.phase = None;
        self.publishes = 0;
    }

    fn replace(&mut self, phase: Phase, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.phase = Some(phase);
        self.publishes += 1;
    }
}

impl OutputSink for OutputBuffer {
    fn publish(&self, phase: Phase, text: &str) {
        self.inner.lock().unwrap().replace(phase, text);
    }

    fn publish_for_run(&self, run_id: u64, phase: Phase, text: &str) {
        let mut state = self.inner.lock().unwrap();
        if run_id < state.run_id {
            debug!(run_id, newest = state.run_id, "Dropping write from stale run");
            return;
        }
        state.run_id = run_id;
        state.replace(phase, text);
    }
}

/// Hands out run identifiers; the most recent one is the only live run.
#[derive(Clone, Default)]
pub struct RunTracker {
    current: Arc<AtomicU64>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, superseding whatever ran before.
    pub fn begin(&self) -> RunGuard {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(run_id = id, "Starting run");
        RunGuard {
            id,
            current: self.current.clone(),
        }
    }

    /// Identifier of the live run (0 before the first run).
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Capability to publish on behalf of one run.
#[derive(Clone)]
pub struct RunGuard {
    id: u64,
    current: Arc<AtomicU64>,
}

impl RunGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }

    /// Fail with [`DatasetError::Superseded`] once a newer run has begun.
    pub fn ensure_current(&self) -> Result<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(DatasetError::Superseded { run_id: self.id })
        }
    }

    /// Publish `text` if this run is still live.
    ///
    /// Sinks that track run ids re-check under their own lock, so a run that is
    /// superseded between the check here and the write still cannot overwrite a
    /// newer run's output.
    pub fn publish(&self, sink: &dyn OutputSink, phase: Phase, text: &str) -> Result<()> {
        self.ensure_current()?;
        sink.publish_for_run(self.id, phase, text);
        Ok(())
    }
}
