//! Abstract image generation interface.
//!
//! The post-processor only needs `context -> url`. The bundled
//! [`PlaceholderImageGenerator`] ignores its context and returns a fixed stock
//! photo URL after a short delay; real backends implement [`ImageGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// URL returned by [`PlaceholderImageGenerator`] unless overridden.
pub const DEFAULT_IMAGE_URL: &str = "https://picsum.photos/200/300";

/// Produces an image URL for a textual description.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for `context` and return where it can be fetched.
    async fn generate_image(&self, context: &str) -> Result<String>;
}

/// Stand-in generator that waits, then returns a fixed URL.
#[derive(Debug, Clone)]
pub struct PlaceholderImageGenerator {
    url: String,
    delay: Duration,
}

impl Default for PlaceholderImageGenerator {
    fn default() -> Self {
        Self {
            url: DEFAULT_IMAGE_URL.to_string(),
            delay: Duration::from_secs(1),
        }
    }
}

impl PlaceholderImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    async fn generate_image(&self, _context: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.url.clone())
    }
}

/// Describe a record for image generation: its full current contents plus the
/// field's meta hint.
pub fn image_context(record: &Map<String, Value>, meta: &str) -> Result<String> {
    let properties = serde_json::to_string(record)?;
    Ok(format!(
        "An image of an object with the following properties: {properties}. \
         Extra information: {meta}"
    ))
}
