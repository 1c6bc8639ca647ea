//! Synthetic JSON dataset generation built on top of `gemini-rust`.
//!
//! Describe a dataset with a concept name, some free-text context and a list of
//! typed fields. The crate derives a JSON Schema from the fields, asks the model for
//! a matching dataset, streams the text to an output sink as it arrives, then
//! replaces every image field with a generated image URL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gemini_dataset_generator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = DatasetClientBuilder::new("your-api-key").build()?;
//!
//!     let request = GenerationRequest::new(
//!         "Book",
//!         vec![
//!             FieldSpec::default_id(),
//!             FieldSpec::text("title"),
//!             FieldSpec::image("cover", "minimalist cover art"),
//!         ],
//!     )
//!     .with_extra_info("Ten science fiction classics");
//!
//!     let output = OutputBuffer::new();
//!     let outcome = client.generate(&request, &output).await?;
//!
//!     println!("{}", outcome.to_pretty_json());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **`cli`**: Build the `datagen` terminal front end.

pub mod client;
pub mod dataset;
pub mod error;
pub mod field;
pub mod image;
pub mod model;
pub mod models;
pub mod output;
pub mod postprocess;
pub mod prompt;
pub mod request;
pub mod schema;
pub mod session;
pub mod stream;

pub use client::{ClientConfig, DatasetClient, DatasetClientBuilder};
pub use dataset::ParsedDataset;
pub use error::{DatasetError, Result, ResultExt};
pub use field::{load_fields, FieldKind, FieldSpec};
pub use image::{image_context, ImageGenerator, PlaceholderImageGenerator, DEFAULT_IMAGE_URL};
pub use model::{DatasetModel, GeminiDatasetModel, MockHandler, MockRequest};
pub use models::GenerationOutcome;
pub use output::{NullSink, OutputBuffer, OutputSink, Phase, RunGuard, RunTracker};
pub use postprocess::enrich_images;
pub use prompt::{compose_prompt, IMAGE_PLACEHOLDER};
pub use request::GenerationRequest;
pub use schema::DatasetSchema;
pub use session::{FormSession, RunStatus, StatusHandle};
pub use stream::{consume_stream, StreamBuffer, TextStream};

/// Prelude module for convenient imports.
///
/// ```rust
/// use gemini_dataset_generator::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{ClientConfig, DatasetClient, DatasetClientBuilder};
    pub use crate::error::{DatasetError, Result, ResultExt};
    pub use crate::field::{FieldKind, FieldSpec};
    pub use crate::image::{ImageGenerator, PlaceholderImageGenerator};
    pub use crate::model::{DatasetModel, MockRequest};
    pub use crate::models::GenerationOutcome;
    pub use crate::output::{OutputBuffer, OutputSink, Phase};
    pub use crate::request::GenerationRequest;
    pub use crate::schema::DatasetSchema;
    pub use crate::session::{FormSession, RunStatus, StatusHandle};

    // Re-export commonly used external types
    pub use gemini_rust::Model;
    pub use serde_json::Value;
}
