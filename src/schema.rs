//! Runtime JSON Schemas derived from a user-declared field list.
//!
//! The record schema maps each [`FieldSpec`] to a primitive rule through
//! [`FieldKind::json_type`]. The envelope schema wraps records in an array keyed by
//! the concept name, which is the exact shape requested from the model.

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use crate::{
    error::{DatasetError, Result},
    field::FieldSpec,
};

/// Record and envelope schemas for one generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSchema {
    concept: String,
    record: Value,
    envelope: Value,
}

impl DatasetSchema {
    /// Fold `fields` into a record schema and wrap it under `concept`.
    ///
    /// Fails when the concept is blank or a field name is blank or repeated.
    pub fn build(concept: &str, fields: &[FieldSpec]) -> Result<Self> {
        check_concept(concept)?;
        check_fields(fields)?;

        let record = record_schema(fields);
        let envelope = envelope_schema(concept, &record);

        Ok(Self {
            concept: concept.to_string(),
            record,
            envelope,
        })
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    /// Schema for a single record.
    pub fn record(&self) -> &Value {
        &self.record
    }

    /// Schema for the whole response, used as the structured-output constraint.
    pub fn envelope(&self) -> &Value {
        &self.envelope
    }

    pub fn into_envelope(self) -> Value {
        self.envelope
    }

    /// Compile the envelope into a validator.
    pub fn validator(&self) -> Result<jsonschema::Validator> {
        jsonschema::validator_for(&self.envelope)
            .map_err(|e| DatasetError::Schema(format!("failed to compile validator: {e}")))
    }

    /// Collect human-readable validation issues for `value`, or `None` when it conforms.
    pub fn validation_issues(&self, value: &Value) -> Result<Option<String>> {
        let validator = self.validator()?;
        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|err| format!("{}: {}", err.instance_path(), err))
            .collect();

        if errors.is_empty() {
            Ok(None)
        } else {
            Ok(Some(errors.join("; ")))
        }
    }
}

fn record_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(field.name.clone(), json!({ "type": field.kind.json_type() }));
    }
    let required: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn envelope_schema(concept: &str, record: &Value) -> Value {
    let mut properties = Map::new();
    properties.insert(
        concept.to_string(),
        json!({
            "type": "array",
            "items": record.clone()
        }),
    );

    json!({
        "type": "object",
        "properties": properties,
        "required": [concept],
        "additionalProperties": false
    })
}

pub(crate) fn check_concept(concept: &str) -> Result<()> {
    if concept.trim().is_empty() {
        return Err(DatasetError::InvalidRequest(
            "concept name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Names must be non-empty and unique; a repeated name would otherwise shadow the
/// earlier column in the schema.
pub(crate) fn check_fields(fields: &[FieldSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for (index, field) in fields.iter().enumerate() {
        if field.name.trim().is_empty() {
            return Err(DatasetError::InvalidRequest(format!(
                "field #{} has an empty name",
                index + 1
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(DatasetError::InvalidRequest(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }
    }
    Ok(())
}
