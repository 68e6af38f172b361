use serde_json::{json, Map, Value};

use editai_contracts::models::{FieldRule, Inclusion, ModelSpec, ValueRule};
use editai_contracts::options::{Mode, RequestOptions};
use editai_contracts::uploads::{UploadedAsset, Uploads};

use crate::util::{json_value_to_form_text, map_object, push_unique_warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Generations,
    Edits,
    Variations,
}

impl Endpoint {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Generate => Endpoint::Generations,
            Mode::Edit => Endpoint::Edits,
            Mode::Variation => Endpoint::Variations,
        }
    }

    /// Path relative to the API base.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Generations => "images/generations",
            Endpoint::Edits => "images/edits",
            Endpoint::Variations => "images/variations",
        }
    }

    /// Shown when an error reply carries no readable message.
    pub fn failure_message(self) -> &'static str {
        match self {
            Endpoint::Generations => "Failed to generate image",
            Endpoint::Edits => "Failed to edit image",
            Endpoint::Variations => "Failed to create variation",
        }
    }

    pub fn empty_message(self) -> &'static str {
        match self {
            Endpoint::Variations => "No variation images returned.",
            Endpoint::Generations | Endpoint::Edits => "No image returned.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: &'static str,
    pub asset: UploadedAsset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Map<String, Value>),
    Multipart {
        fields: Vec<(String, Value)>,
        files: Vec<FilePart>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub endpoint: Endpoint,
    pub model: String,
    pub body: RequestBody,
    pub warnings: Vec<String>,
}

impl ProviderRequest {
    pub fn param(&self, key: &str) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(map) => map.get(key),
            RequestBody::Multipart { fields, .. } => fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
        }
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    pub fn param_text(&self, key: &str) -> Option<String> {
        self.param(key).map(json_value_to_form_text)
    }

    pub fn files(&self) -> &[FilePart] {
        match &self.body {
            RequestBody::Json(_) => &[],
            RequestBody::Multipart { files, .. } => files.as_slice(),
        }
    }

    /// MIME type for inline (`b64_json`) results: the requested output format,
    /// PNG when none was sent.
    pub fn inline_mime(&self) -> String {
        match self.param_text("output_format").as_deref() {
            Some("jpeg") => "image/jpeg".to_string(),
            Some("webp") => "image/webp".to_string(),
            _ => "image/png".to_string(),
        }
    }

    /// Loggable description of the request; file contents are reduced to
    /// name, type and size.
    pub fn manifest(&self) -> Map<String, Value> {
        let mut payload = match &self.body {
            RequestBody::Json(map) => map.clone(),
            RequestBody::Multipart { fields, .. } => fields.iter().cloned().collect(),
        };
        if !self.files().is_empty() {
            let files = self
                .files()
                .iter()
                .map(|part| {
                    json!({
                        "field": part.field,
                        "file_name": part.asset.file_name,
                        "mime_type": part.asset.mime_type,
                        "bytes": part.asset.byte_len(),
                    })
                })
                .collect();
            payload.insert("files".to_string(), Value::Array(files));
        }
        map_object(json!({
            "endpoint": self.endpoint.path(),
            "model": self.model,
            "payload": payload,
            "warnings": self.warnings,
        }))
    }
}

/// Turns a validated form into the wire request for `model`.
///
/// Only fields the model declares for `mode` are sent. A declared field whose
/// value the model does not accept is dropped with a warning; an unsupported
/// size is swapped for the model default, also with a warning.
pub fn build_request(
    model: &ModelSpec,
    mode: Mode,
    options: &RequestOptions,
    prompt: &str,
    uploads: &Uploads,
) -> Result<ProviderRequest, String> {
    let mut warnings = Vec::new();
    let size = resolve_size(model, &options.size, &mut warnings);
    let prompt = prompt.trim().to_string();

    let mut params: Vec<(String, Value)> = match mode {
        Mode::Generate => vec![
            ("prompt".to_string(), Value::String(prompt)),
            ("model".to_string(), Value::String(model.name.clone())),
            ("n".to_string(), Value::from(options.n)),
            ("size".to_string(), Value::String(size)),
        ],
        Mode::Edit => vec![
            ("prompt".to_string(), Value::String(prompt)),
            ("model".to_string(), Value::String(model.name.clone())),
            ("size".to_string(), Value::String(size)),
        ],
        Mode::Variation => vec![
            ("n".to_string(), Value::from(options.n)),
            ("size".to_string(), Value::String(size)),
            ("model".to_string(), Value::String(model.name.clone())),
        ],
    };
    for rule in model.field_rules(mode) {
        if let Some(value) = rule_value(rule, options, &model.name, &mut warnings) {
            params.push((rule.field.as_str().to_string(), value));
        }
    }

    let body = match mode {
        Mode::Generate => RequestBody::Json(params.into_iter().collect()),
        Mode::Edit | Mode::Variation => {
            let image = uploads.image.clone().ok_or_else(|| {
                if mode == Mode::Edit {
                    "Please upload an image to edit.".to_string()
                } else {
                    "Please upload a PNG image for variation.".to_string()
                }
            })?;
            let mut files = vec![FilePart {
                field: "image",
                asset: image,
            }];
            if mode == Mode::Edit {
                if let Some(mask) = uploads.mask.clone() {
                    files.push(FilePart {
                        field: "mask",
                        asset: mask,
                    });
                }
            }
            RequestBody::Multipart {
                fields: params,
                files,
            }
        }
    };

    Ok(ProviderRequest {
        endpoint: Endpoint::for_mode(mode),
        model: model.name.clone(),
        body,
        warnings,
    })
}

fn resolve_size(model: &ModelSpec, requested: &str, warnings: &mut Vec<String>) -> String {
    let requested = requested.trim();
    if model.supports_size(requested) {
        return requested.to_string();
    }
    let fallback = model.default_size();
    push_unique_warning(
        warnings,
        format!(
            "{} does not support size '{requested}'; using {fallback}.",
            model.name
        ),
    );
    fallback.to_string()
}

fn rule_value(
    rule: &FieldRule,
    options: &RequestOptions,
    model_name: &str,
    warnings: &mut Vec<String>,
) -> Option<Value> {
    let raw = json_value_to_form_text(&options.get(rule.field));
    let text = raw.trim();
    let included = match rule.inclusion {
        Inclusion::Always => true,
        Inclusion::Except(sentinel) => text != sentinel,
        Inclusion::NonEmpty => !text.is_empty(),
        Inclusion::CompressedOutput => {
            matches!(options.output_format.as_str(), "jpeg" | "webp") && text != "100"
        }
    };
    if !included {
        return None;
    }
    if !rule.values.admits(text) {
        push_unique_warning(
            warnings,
            format!(
                "{model_name} does not accept {} '{text}'; omitted.",
                rule.field
            ),
        );
        return None;
    }
    match rule.values {
        ValueRule::Range(..) => text.parse::<u32>().ok().map(Value::from),
        ValueRule::OneOf(_) | ValueRule::Text => Some(Value::String(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use editai_contracts::models::{ModelRegistry, ModelSpec};
    use editai_contracts::options::{Mode, OptionField, RequestOptions};
    use editai_contracts::uploads::{UploadedAsset, Uploads};

    use super::{build_request, Endpoint, RequestBody};

    fn model(name: &str) -> ModelSpec {
        ModelRegistry::default()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("missing model {name}"))
    }

    fn options(pairs: &[(OptionField, &str)]) -> RequestOptions {
        let mut options = RequestOptions::default();
        for (field, value) in pairs {
            options.set(*field, value).unwrap();
        }
        options
    }

    fn edit_uploads(with_mask: bool) -> Uploads {
        Uploads {
            image: Some(UploadedAsset::new("photo.png", "image/png", vec![1, 2, 3])),
            mask: with_mask.then(|| UploadedAsset::new("mask.png", "image/png", vec![4, 5])),
        }
    }

    #[test]
    fn style_is_only_sent_to_dall_e_3() -> Result<(), String> {
        let registry = ModelRegistry::default();
        let options = options(&[(OptionField::Style, "natural")]);
        for model in registry.by_mode(Mode::Generate) {
            let request = build_request(&model, Mode::Generate, &options, "a fox", &Uploads::default())?;
            assert_eq!(
                request.has_param("style"),
                model.name == "dall-e-3",
                "style on {}",
                model.name
            );
        }
        for mode in [Mode::Edit, Mode::Variation] {
            for model in registry.by_mode(mode) {
                let request = build_request(&model, mode, &options, "a fox", &edit_uploads(false))?;
                assert!(!request.has_param("style"));
            }
        }
        Ok(())
    }

    #[test]
    fn only_declared_fields_reach_the_wire() -> Result<(), String> {
        let registry = ModelRegistry::default();
        let options = options(&[
            (OptionField::Quality, "high"),
            (OptionField::Background, "transparent"),
            (OptionField::OutputFormat, "webp"),
            (OptionField::OutputCompression, "50"),
            (OptionField::User, "someone"),
        ]);
        for mode in [Mode::Generate, Mode::Edit, Mode::Variation] {
            for model in registry.by_mode(mode) {
                let request = build_request(&model, mode, &options, "a fox", &edit_uploads(false))?;
                let base: &[&str] = match mode {
                    Mode::Generate => &["prompt", "model", "n", "size"],
                    Mode::Edit => &["prompt", "model", "size"],
                    Mode::Variation => &["n", "size", "model"],
                };
                let keys: Vec<String> = match &request.body {
                    RequestBody::Json(map) => map.keys().cloned().collect(),
                    RequestBody::Multipart { fields, .. } => {
                        fields.iter().map(|(key, _)| key.clone()).collect()
                    }
                };
                for key in keys {
                    let declared = base.contains(&key.as_str())
                        || model
                            .field_rules(mode)
                            .iter()
                            .any(|rule| rule.field.as_str() == key);
                    assert!(declared, "{key} sent to {} in {mode}", model.name);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn generate_json_for_dall_e_2_defaults() -> Result<(), String> {
        let request = build_request(
            &model("dall-e-2"),
            Mode::Generate,
            &RequestOptions::default(),
            "  a red ball ",
            &Uploads::default(),
        )?;
        assert_eq!(request.endpoint, Endpoint::Generations);
        let RequestBody::Json(map) = &request.body else {
            panic!("generate must send JSON");
        };
        assert_eq!(
            Value::Object(map.clone()),
            json!({
                "prompt": "a red ball",
                "model": "dall-e-2",
                "n": 1,
                "size": "1024x1024",
                "response_format": "url",
            })
        );
        assert!(request.warnings.is_empty());
        assert_eq!(request.inline_mime(), "image/png");
        Ok(())
    }

    #[test]
    fn unsupported_values_are_omitted_with_warning() -> Result<(), String> {
        let options = options(&[(OptionField::Quality, "hd"), (OptionField::Size, "512x512")]);
        let request = build_request(
            &model("dall-e-3"),
            Mode::Generate,
            &options,
            "a fox",
            &Uploads::default(),
        )?;
        assert_eq!(request.param("quality"), Some(&json!("hd")));
        assert_eq!(request.param("size"), Some(&json!("1024x1024")));
        assert_eq!(request.warnings.len(), 1);

        let request = build_request(
            &model("dall-e-2"),
            Mode::Generate,
            &options,
            "a fox",
            &Uploads::default(),
        )?;
        assert!(!request.has_param("quality"));
        assert_eq!(request.param("size"), Some(&json!("512x512")));
        assert_eq!(
            request.warnings,
            vec!["dall-e-2 does not accept quality 'hd'; omitted."]
        );
        Ok(())
    }

    #[test]
    fn compression_needs_lossy_format() -> Result<(), String> {
        let gpt = model("gpt-image-1");
        let png = options(&[(OptionField::OutputCompression, "80")]);
        let request = build_request(&gpt, Mode::Generate, &png, "a fox", &Uploads::default())?;
        assert!(!request.has_param("output_compression"));

        let jpeg = options(&[
            (OptionField::OutputFormat, "jpg"),
            (OptionField::OutputCompression, "80"),
        ]);
        let request = build_request(&gpt, Mode::Generate, &jpeg, "a fox", &Uploads::default())?;
        assert_eq!(request.param("output_compression"), Some(&json!(80)));
        assert_eq!(request.param("output_format"), Some(&json!("jpeg")));
        assert_eq!(request.inline_mime(), "image/jpeg");

        let full = options(&[(OptionField::OutputFormat, "webp")]);
        let request = build_request(&gpt, Mode::Generate, &full, "a fox", &Uploads::default())?;
        assert!(!request.has_param("output_compression"));
        Ok(())
    }

    #[test]
    fn blank_user_is_not_sent() -> Result<(), String> {
        let spaced = options(&[(OptionField::User, "   ")]);
        let request = build_request(
            &model("dall-e-2"),
            Mode::Generate,
            &spaced,
            "a fox",
            &Uploads::default(),
        )?;
        assert!(!request.has_param("user"));

        let named = options(&[(OptionField::User, " team-a ")]);
        let request = build_request(
            &model("dall-e-2"),
            Mode::Generate,
            &named,
            "a fox",
            &Uploads::default(),
        )?;
        assert_eq!(request.param("user"), Some(&json!("team-a")));
        Ok(())
    }

    #[test]
    fn edit_is_multipart_with_mask() -> Result<(), String> {
        let options = options(&[(OptionField::Quality, "medium")]);
        let request = build_request(
            &model("gpt-image-1"),
            Mode::Edit,
            &options,
            "add a hat",
            &edit_uploads(true),
        )?;
        assert_eq!(request.endpoint, Endpoint::Edits);
        let fields: Vec<&str> = request.files().iter().map(|part| part.field).collect();
        assert_eq!(fields, vec!["image", "mask"]);
        assert!(!request.has_param("n"));
        assert_eq!(request.param("quality"), Some(&json!("medium")));
        assert_eq!(request.param("background"), Some(&json!("auto")));

        let manifest = request.manifest();
        assert_eq!(manifest["endpoint"], json!("images/edits"));
        assert_eq!(manifest["payload"]["files"][1]["bytes"], json!(2));
        Ok(())
    }

    #[test]
    fn variation_sends_n_and_response_format() -> Result<(), String> {
        let options = options(&[(OptionField::N, "3"), (OptionField::ResponseFormat, "b64_json")]);
        let request = build_request(
            &model("dall-e-2"),
            Mode::Variation,
            &options,
            "",
            &edit_uploads(true),
        )?;
        assert_eq!(request.endpoint, Endpoint::Variations);
        assert_eq!(request.param("n"), Some(&json!(3)));
        assert_eq!(request.param("model"), Some(&json!("dall-e-2")));
        assert_eq!(request.param("response_format"), Some(&json!("b64_json")));
        assert!(!request.has_param("prompt"));
        assert_eq!(request.files().len(), 1);
        Ok(())
    }
}
