//! Second pass: resolve image fields one call at a time.

use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    dataset::ParsedDataset,
    error::{DatasetError, Result},
    field::FieldSpec,
    image::{image_context, ImageGenerator},
    output::{OutputSink, Phase, RunGuard},
};

/// Overwrite every image field of every record with a generated URL.
///
/// Records are visited in order and, within a record, image fields in declaration
/// order. Each call sees the record as it is at that moment, including URLs already
/// resolved earlier in the same record. The whole dataset is republished after
/// every field. Returns the number of image calls made.
#[instrument(skip_all, fields(run_id = guard.id(), concept = dataset.concept()))]
pub async fn enrich_images(
    dataset: &mut ParsedDataset,
    fields: &[FieldSpec],
    generator: &dyn ImageGenerator,
    guard: &RunGuard,
    sink: &dyn OutputSink,
) -> Result<usize> {
    let image_fields: Vec<&FieldSpec> = fields.iter().filter(|f| f.kind.is_image()).collect();
    if image_fields.is_empty() || dataset.is_empty() {
        return Ok(0);
    }
    guard.ensure_current()?;
    sink.enter_phase(Phase::Enriching);

    let mut calls = 0usize;
    for index in 0..dataset.len() {
        for field in &image_fields {
            guard.ensure_current()?;

            let context = {
                let record = dataset.record_mut(index).ok_or_else(|| {
                    DatasetError::Context(format!("record #{} disappeared", index + 1))
                })?;
                image_context(record, &field.meta)?
            };

            let url = generator
                .generate_image(&context)
                .await
                .map_err(|e| DatasetError::image_error(&field.name, e.to_string()))?;
            calls += 1;
            debug!(record = index, field = %field.name, url = %url, "Resolved image");

            if let Some(record) = dataset.record_mut(index) {
                record.insert(field.name.clone(), Value::String(url));
            }
            guard.publish(sink, Phase::Enriching, &dataset.to_pretty_json()?)?;
        }
    }

    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputBuffer, RunTracker};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Returns `https://img.test/<n>` for the n-th call and records each context.
    #[derive(Default)]
    struct CountingGenerator {
        contexts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageGenerator for CountingGenerator {
        async fn generate_image(&self, context: &str) -> Result<String> {
            let mut contexts = self.contexts.lock().unwrap();
            contexts.push(context.to_string());
            Ok(format!("https://img.test/{}", contexts.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ImageGenerator for FailingGenerator {
        async fn generate_image(&self, _context: &str) -> Result<String> {
            Err(DatasetError::Context("quota exceeded".to_string()))
        }
    }

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::number("id"),
            FieldSpec::image("photo", "front view"),
            FieldSpec::text("name"),
            FieldSpec::image("thumb", "small"),
        ]
    }

    fn dataset() -> ParsedDataset {
        let raw = json!({"Car": [
            {"id": 1, "photo": "p", "name": "a", "thumb": "p"},
            {"id": 2, "photo": "p", "name": "b", "thumb": "p"},
            {"id": 3, "photo": "p", "name": "c", "thumb": "p"}
        ]});
        ParsedDataset::parse("Car", &raw.to_string()).unwrap()
    }

    #[tokio::test]
    async fn issues_one_call_per_record_and_image_field() {
        let mut dataset = dataset();
        let generator = CountingGenerator::default();
        let guard = RunTracker::new().begin();
        let output = OutputBuffer::new();

        let calls = enrich_images(&mut dataset, &fields(), &generator, &guard, &output)
            .await
            .unwrap();

        assert_eq!(calls, 6);
        assert_eq!(output.publish_count(), 6);
        assert_eq!(output.phase(), Some(Phase::Enriching));

        let expected = json!({"Car": [
            {"id": 1, "photo": "https://img.test/1", "name": "a", "thumb": "https://img.test/2"},
            {"id": 2, "photo": "https://img.test/3", "name": "b", "thumb": "https://img.test/4"},
            {"id": 3, "photo": "https://img.test/5", "name": "c", "thumb": "https://img.test/6"}
        ]});
        assert_eq!(dataset.as_value(), &expected);
        assert_eq!(output.snapshot(), dataset.to_pretty_json().unwrap());
    }

    #[tokio::test]
    async fn context_reflects_record_at_call_time() {
        let mut dataset = dataset();
        let generator = CountingGenerator::default();
        let guard = RunTracker::new().begin();

        enrich_images(&mut dataset, &fields(), &generator, &guard, &crate::output::NullSink)
            .await
            .unwrap();

        let contexts = generator.contexts.lock().unwrap();
        assert!(contexts[0].contains(r#""photo":"p""#));
        assert!(contexts[0].ends_with("Extra information: front view"));
        assert!(contexts[1].contains(r#""photo":"https://img.test/1""#));
        assert!(contexts[1].ends_with("Extra information: small"));
    }

    #[tokio::test]
    async fn no_image_fields_means_no_calls() {
        let mut dataset = dataset();
        let before = dataset.clone();
        let generator = CountingGenerator::default();
        let guard = RunTracker::new().begin();
        let text_only = vec![FieldSpec::number("id"), FieldSpec::text("name")];

        let calls = enrich_images(&mut dataset, &text_only, &generator, &guard, &crate::output::NullSink)
            .await
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(dataset, before);
    }

    #[tokio::test]
    async fn generator_failure_names_the_field() {
        let mut dataset = dataset();
        let guard = RunTracker::new().begin();

        let err = enrich_images(&mut dataset, &fields(), &FailingGenerator, &guard, &crate::output::NullSink)
            .await
            .unwrap_err();

        match err {
            DatasetError::ImageGeneration { field, message } => {
                assert_eq!(field, "photo");
                assert!(message.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn superseded_run_stops_enriching() {
        let mut dataset = dataset();
        let before = dataset.clone();
        let tracker = RunTracker::new();
        let stale = tracker.begin();
        tracker.begin();

        let err = enrich_images(
            &mut dataset,
            &fields(),
            &CountingGenerator::default(),
            &stale,
            &crate::output::NullSink,
        )
        .await
        .unwrap_err();

        assert!(err.is_superseded());
        assert_eq!(dataset, before);
    }
}
