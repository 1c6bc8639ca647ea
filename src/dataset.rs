use serde_json::{Map, Value};

use crate::error::{DatasetError, Result};

/// A parsed response: an object holding an array of record objects under the
/// concept key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDataset {
    concept: String,
    value: Value,
}

impl ParsedDataset {
    /// Parse accumulated stream text.
    ///
    /// Either the whole document has the envelope shape or no dataset is produced.
    pub fn parse(concept: &str, text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DatasetError::parse_error(e, text))?;
        Self::from_value(concept, value, text)
    }

    /// Like [`parse`](Self::parse), but first strips Markdown code fences and any
    /// chatter around the outermost JSON value.
    pub fn parse_lenient(concept: &str, text: &str) -> Result<Self> {
        let cleaned = clean_json_text(text);
        Self::parse(concept, &cleaned)
    }

    fn from_value(concept: &str, value: Value, raw: &str) -> Result<Self> {
        let records = value
            .as_object()
            .ok_or_else(|| DatasetError::shape_error("top-level value is not an object", raw))?
            .get(concept)
            .ok_or_else(|| {
                DatasetError::shape_error(format!("missing '{concept}' property"), raw)
            })?
            .as_array()
            .ok_or_else(|| {
                DatasetError::shape_error(format!("'{concept}' is not an array"), raw)
            })?;

        if let Some(index) = records.iter().position(|r| !r.is_object()) {
            return Err(DatasetError::shape_error(
                format!("record #{} of '{concept}' is not an object", index + 1),
                raw,
            ));
        }

        Ok(Self {
            concept: concept.to_string(),
            value,
        })
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    pub fn records(&self) -> &[Value] {
        self.value
            .get(&self.concept)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Mutable access to one record.
    pub fn record_mut(&mut self, index: usize) -> Option<&mut Map<String, Value>> {
        self.value
            .get_mut(&self.concept)?
            .as_array_mut()?
            .get_mut(index)?
            .as_object_mut()
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.value)?)
    }
}

/// Strip Markdown code fences from the response text.
pub(crate) fn clean_json_text(text: &str) -> String {
    let text = text.trim();

    if let Some(start) = text.find("```") {
        if let Some(end) = text.rfind("```") {
            if start < end {
                // Skip the info string ("json") after the opening fence.
                if let Some(newline) = text[start..end].find('\n') {
                    let content_start = start + newline + 1;
                    if content_start < end {
                        return text[content_start..end].trim().to_string();
                    }
                }
            }
        }
    }

    if let Some(start) = text.find(['{', '[']) {
        if let Some(end) = text.rfind(['}', ']']) {
            if start <= end {
                return text[start..=end].to_string();
            }
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_book_envelope() {
        let dataset = ParsedDataset::parse("Book", r#"{"Book":[{"id":1,"title":"A"}]}"#).unwrap();
        assert_eq!(dataset.as_value(), &json!({"Book": [{"id": 1, "title": "A"}]}));
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn plain_text_is_malformed() {
        let err = ParsedDataset::parse("Book", "not json").unwrap_err();
        assert!(matches!(err, DatasetError::MalformedResponse { .. }));
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        for raw in [
            r#"[{"id":1}]"#,
            r#"{"Books":[]}"#,
            r#"{"Book":{"id":1}}"#,
            r#"{"Book":[1,2]}"#,
        ] {
            let err = ParsedDataset::parse("Book", raw).unwrap_err();
            assert!(
                matches!(err, DatasetError::MalformedResponse { .. }),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn lenient_parse_strips_fences() {
        let raw = "```json\n{\"Book\": []}\n```";
        assert!(ParsedDataset::parse("Book", raw).is_err());
        let dataset = ParsedDataset::parse_lenient("Book", raw).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn lenient_parse_still_rejects_plain_text() {
        assert!(ParsedDataset::parse_lenient("Book", "not json").is_err());
    }

    #[test]
    fn pretty_json_uses_two_space_indent() {
        let dataset = ParsedDataset::parse("Book", r#"{"Book":[{"id":1}]}"#).unwrap();
        let pretty = dataset.to_pretty_json().unwrap();
        assert_eq!(pretty, "{\n  \"Book\": [\n    {\n      \"id\": 1\n    }\n  ]\n}");
    }
}
