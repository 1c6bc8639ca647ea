//! Incremental consumption of the model's token stream.

use futures::{stream::BoxStream, StreamExt};
use tracing::{debug, instrument, trace};

use crate::{
    error::Result,
    output::{OutputSink, Phase, RunGuard},
};

/// Stream of text deltas produced by a model backend.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Append-only accumulator for streamed text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamBuffer {
    text: String,
    chunks: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta. Empty deltas are ignored and not counted.
    pub fn push(&mut self, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        self.text.push_str(delta);
        self.chunks += 1;
        true
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of non-empty deltas appended.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Freeze the buffer once the stream has ended.
    pub fn finish(self) -> String {
        self.text
    }
}

/// Drain `stream` into a [`StreamBuffer`], republishing the whole buffer after
/// every non-empty delta.
///
/// Stops at the first upstream error, or with `Superseded` as soon as a newer run
/// has begun. The run is checked once more after the stream ends, since a newer run
/// may start while the last item is still pending.
#[instrument(skip_all, fields(run_id = guard.id()))]
pub async fn consume_stream(
    mut stream: TextStream,
    guard: &RunGuard,
    sink: &dyn OutputSink,
) -> Result<StreamBuffer> {
    let mut buffer = StreamBuffer::new();

    while let Some(delta) = stream.next().await {
        let delta = delta?;
        guard.ensure_current()?;
        if !buffer.push(&delta) {
            continue;
        }
        trace!(delta = %delta, "Received chunk");
        guard.publish(sink, Phase::Streaming, buffer.as_str())?;
    }
    guard.ensure_current()?;

    debug!(
        chunks = buffer.chunk_count(),
        length = buffer.as_str().len(),
        "Stream finished"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DatasetError, output::RunTracker};
    use futures::stream;
    use std::sync::{Arc, Mutex};

    fn text_stream(chunks: &[&str]) -> TextStream {
        let items: Vec<Result<String>> = chunks.iter().map(|c| Ok(c.to_string())).collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn accumulates_chunks_in_order() {
        let chunks = ["{\"Book\":[", "{\"id\":1,", "\"title\":\"A\"}]}"];
        let guard = RunTracker::new().begin();
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let published = published.clone();
            move |_: Phase, text: &str| published.lock().unwrap().push(text.to_string())
        };

        let buffer = consume_stream(text_stream(&chunks), &guard, &sink)
            .await
            .unwrap();

        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.as_str(), chunks.concat());

        let published = published.lock().unwrap();
        assert_eq!(published.len(), 3);
        assert_eq!(published[0], chunks[0]);
        assert_eq!(published[1], chunks[..2].concat());
        assert_eq!(published[2], chunks.concat());
    }

    #[tokio::test]
    async fn empty_deltas_are_not_republished() {
        let guard = RunTracker::new().begin();
        let count = Arc::new(Mutex::new(0usize));
        let sink = {
            let count = count.clone();
            move |_: Phase, _: &str| *count.lock().unwrap() += 1
        };

        let buffer = consume_stream(text_stream(&["[", "", "]"]), &guard, &sink)
            .await
            .unwrap();

        assert_eq!(buffer.finish(), "[]");
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn upstream_error_aborts_consumption() {
        let guard = RunTracker::new().begin();
        let items: Vec<Result<String>> = vec![
            Ok("{".to_string()),
            Err(DatasetError::Context("connection reset".to_string())),
            Ok("}".to_string()),
        ];

        let err = consume_stream(Box::pin(stream::iter(items)), &guard, &crate::output::NullSink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn superseded_run_stops_before_publishing() {
        let tracker = RunTracker::new();
        let stale = tracker.begin();
        let _fresh = tracker.begin();

        let err = consume_stream(text_stream(&["{}"]), &stale, &crate::output::NullSink)
            .await
            .unwrap_err();
        assert!(err.is_superseded());
    }

    #[tokio::test]
    async fn run_superseded_at_end_of_stream_is_reported() {
        let tracker = RunTracker::new();
        let stale = tracker.begin();

        let first: Vec<Result<String>> = vec![Ok("not json".to_string())];
        let takeover = {
            let tracker = tracker.clone();
            stream::once(async move {
                tracker.begin();
            })
            .filter_map(|_| async { None::<Result<String>> })
        };
        let text: TextStream = Box::pin(stream::iter(first).chain(takeover));

        let err = consume_stream(text, &stale, &crate::output::NullSink)
            .await
            .unwrap_err();
        assert!(err.is_superseded());
    }
}
