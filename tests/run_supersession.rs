use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use gemini_dataset_generator::prelude::*;
use gemini_dataset_generator::TextStream;
use serde_json::{json, Value};
use tokio::sync::Notify;

/// The first stream waits for `release` before yielding; later streams answer at once.
struct GatedModel {
    calls: AtomicUsize,
    first_started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl DatasetModel for GatedModel {
    async fn stream_dataset(&self, _prompt: &str, _schema: &Value) -> Result<TextStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.first_started.notify_one();
            let release = self.release.clone();
            let gated = stream::once(async move {
                release.notified().await;
                Ok::<_, DatasetError>(r#"{"Book":[{"id":1,"title":"stale"}]}"#.to_string())
            });
            return Ok(gated.boxed());
        }
        let fresh: Vec<Result<String>> =
            vec![Ok(r#"{"Book":[{"id":2,"title":"fresh"}]}"#.to_string())];
        Ok(stream::iter(fresh).boxed())
    }
}

#[tokio::test]
async fn newer_run_supersedes_in_flight_run() {
    let first_started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let client = DatasetClientBuilder::new("unused")
        .with_model_backend(GatedModel {
            calls: AtomicUsize::new(0),
            first_started: first_started.clone(),
            release: release.clone(),
        })
        .build()
        .unwrap();

    let request = GenerationRequest::new(
        "Book",
        vec![FieldSpec::number("id"), FieldSpec::text("title")],
    );
    let output = OutputBuffer::new();

    let stale_run = {
        let client = client.clone();
        let request = request.clone();
        let output = output.clone();
        tokio::spawn(async move { client.generate(&request, &output).await })
    };
    first_started.notified().await;

    let fresh = client.generate(&request, &output).await.unwrap();
    assert_eq!(fresh.dataset, json!({"Book": [{"id": 2, "title": "fresh"}]}));

    release.notify_one();
    let stale = stale_run.await.unwrap();
    let err = stale.unwrap_err();
    assert!(err.is_superseded());

    assert_eq!(output.snapshot(), r#"{"Book":[{"id":2,"title":"fresh"}]}"#);
    assert_eq!(client.runs().current(), fresh.run_id);
}

#[tokio::test]
async fn run_ids_increase_per_run() {
    let client = DatasetClientBuilder::new("mock-key")
        .with_mock(|_req: MockRequest| Ok(vec![r#"{"Book":[]}"#.to_string()]))
        .build()
        .unwrap();
    let request = GenerationRequest::new("Book", vec![FieldSpec::default_id()]);

    let first = client.generate(&request, &OutputBuffer::new()).await.unwrap();
    let second = client.generate(&request, &OutputBuffer::new()).await.unwrap();

    assert!(second.run_id > first.run_id);
    assert!(second.finished_at >= second.started_at);
}

/// First stream sends malformed text, then stays open until `release` and ends
/// without another item.
struct TrailingGateModel {
    calls: AtomicUsize,
    first_started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl DatasetModel for TrailingGateModel {
    async fn stream_dataset(&self, _prompt: &str, _schema: &Value) -> Result<TextStream> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let started = self.first_started.clone();
            let release = self.release.clone();
            let head: Vec<Result<String>> = vec![Ok("not json".to_string())];
            let tail = stream::once(async move {
                started.notify_one();
                release.notified().await;
            })
            .filter_map(|_| async { None::<Result<String>> });
            return Ok(stream::iter(head).chain(tail).boxed());
        }
        let fresh: Vec<Result<String>> = vec![Ok(r#"{"Book":[{"id":2}]}"#.to_string())];
        Ok(stream::iter(fresh).boxed())
    }
}

#[tokio::test]
async fn run_superseded_while_stream_closes_reports_superseded() {
    let first_started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let client = DatasetClientBuilder::new("unused")
        .with_model_backend(TrailingGateModel {
            calls: AtomicUsize::new(0),
            first_started: first_started.clone(),
            release: release.clone(),
        })
        .build()
        .unwrap();
    let request = GenerationRequest::new("Book", vec![FieldSpec::default_id()]);

    let stale_run = {
        let client = client.clone();
        let request = request.clone();
        tokio::spawn(async move { client.generate(&request, &OutputBuffer::new()).await })
    };
    first_started.notified().await;

    client
        .generate(&request, &OutputBuffer::new())
        .await
        .unwrap();
    release.notify_one();

    let err = stale_run.await.unwrap().unwrap_err();
    assert!(err.is_superseded(), "expected superseded, got {err:?}");
}
