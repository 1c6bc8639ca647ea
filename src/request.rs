use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    field::FieldSpec,
    schema::{check_concept, check_fields, DatasetSchema},
};

/// Immutable snapshot of the form taken when generation is triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub concept_name: String,
    #[serde(default)]
    pub extra_info: String,
    pub fields: Vec<FieldSpec>,
}

impl GenerationRequest {
    pub fn new(concept_name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            concept_name: concept_name.into(),
            extra_info: String::new(),
            fields,
        }
    }

    pub fn with_extra_info(mut self, extra_info: impl Into<String>) -> Self {
        self.extra_info = extra_info.into();
        self
    }

    /// Reject requests that cannot produce a well-formed schema.
    pub fn validate(&self) -> Result<()> {
        check_concept(&self.concept_name)?;
        check_fields(&self.fields)
    }

    pub fn schema(&self) -> Result<DatasetSchema> {
        DatasetSchema::build(&self.concept_name, &self.fields)
    }

    /// Fields that the post-processor resolves to image URLs, in declaration order.
    pub fn image_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.kind.is_image())
    }
}
