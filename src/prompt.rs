//! Natural-language instruction sent with every generation request.

use serde_json::{json, Map, Value};

use crate::{error::Result, request::GenerationRequest};

/// Value the model must put in every image field during the first pass.
pub const IMAGE_PLACEHOLDER: &str = "https://placehold.co/600x400/EEE/31343C";

/// Compose the instruction for `request`.
///
/// The prompt embeds a pretty-printed description of the dataset, with the
/// field-type map in declaration order. Identical requests always yield identical
/// prompts.
pub fn compose_prompt(request: &GenerationRequest) -> Result<String> {
    let description = serde_json::to_string_pretty(&describe(request))?;

    Ok(format!(
        "Please generate a dataset for this data {description}. \
         Just provide the pretty printed JSON nothing else. \
         Return a JSON object with a single property \"{concept}\" holding an array of records. \
         When you encounter an image property, just use the value '{IMAGE_PLACEHOLDER}'.",
        concept = request.concept_name,
    ))
}

fn describe(request: &GenerationRequest) -> Value {
    let mut fields = Map::new();
    for field in &request.fields {
        fields.insert(field.name.clone(), Value::from(field.kind.tag()));
    }

    json!({
        "conceptName": request.concept_name,
        "extraInfo": request.extra_info,
        "fields": fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSpec;

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "Fruit",
            vec![
                FieldSpec::default_id(),
                FieldSpec::text("name"),
                FieldSpec::image("photo", "studio lighting"),
            ],
        )
        .with_extra_info("tropical fruits only")
    }

    #[test]
    fn prompt_is_deterministic() {
        let req = request();
        assert_eq!(compose_prompt(&req).unwrap(), compose_prompt(&req).unwrap());
    }

    #[test]
    fn prompt_embeds_description_and_placeholder() {
        let prompt = compose_prompt(&request()).unwrap();

        assert!(prompt.contains("\"conceptName\": \"Fruit\""));
        assert!(prompt.contains("\"extraInfo\": \"tropical fruits only\""));
        assert!(prompt.contains("\"photo\": \"image\""));
        assert!(prompt.contains("\"name\": \"string\""));
        assert!(prompt.contains(IMAGE_PLACEHOLDER));
        assert!(prompt.contains("pretty printed JSON"));
    }

    #[test]
    fn field_map_keeps_declaration_order() {
        let prompt = compose_prompt(&request()).unwrap();
        let id = prompt.find("\"id\"").unwrap();
        let name = prompt.find("\"name\"").unwrap();
        let photo = prompt.find("\"photo\"").unwrap();
        assert!(id < name && name < photo);
    }

    #[test]
    fn prompt_changes_with_inputs() {
        let a = compose_prompt(&request()).unwrap();
        let b = compose_prompt(&request().with_extra_info("berries")).unwrap();
        assert_ne!(a, b);
    }
}
