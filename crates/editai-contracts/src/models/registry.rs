use indexmap::IndexMap;

use crate::options::{Mode, OptionField};

const MB: u64 = 1024 * 1024;

/// When an optional field goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    Always,
    /// Omitted while the value equals the given sentinel (usually "auto").
    Except(&'static str),
    /// Omitted when the trimmed text is empty.
    NonEmpty,
    /// output_compression: only with a lossy output_format and a value other than 100.
    CompressedOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRule {
    OneOf(&'static [&'static str]),
    Range(u32, u32),
    Text,
}

impl ValueRule {
    pub fn admits(&self, value: &str) -> bool {
        match self {
            ValueRule::OneOf(values) => values.iter().any(|item| *item == value),
            ValueRule::Range(lo, hi) => value
                .parse::<u32>()
                .map(|number| (*lo..=*hi).contains(&number))
                .unwrap_or(false),
            ValueRule::Text => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: OptionField,
    pub inclusion: Inclusion,
    pub values: ValueRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadRule {
    pub mime_types: &'static [&'static str],
    pub max_bytes: u64,
}

pub const MASK_UPLOAD: UploadRule = UploadRule {
    mime_types: &["image/png"],
    max_bytes: 4 * MB,
};

pub const VARIATION_UPLOAD: UploadRule = UploadRule {
    mime_types: &["image/png"],
    max_bytes: 4 * MB,
};

pub const VARIATION_MAX_N: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub modes: Vec<Mode>,
    pub sizes: Vec<&'static str>,
    pub prompt_max_chars: usize,
    pub max_n: u32,
    pub edit_upload: Option<UploadRule>,
    pub fields: IndexMap<Mode, Vec<FieldRule>>,
}

impl ModelSpec {
    pub fn supports(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    pub fn default_size(&self) -> &'static str {
        self.sizes.first().copied().unwrap_or("1024x1024")
    }

    pub fn supports_size(&self, size: &str) -> bool {
        self.sizes.iter().any(|item| *item == size)
    }

    pub fn field_rules(&self, mode: Mode) -> &[FieldRule] {
        self.fields.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rule_for(&self, mode: Mode, field: OptionField) -> Option<&FieldRule> {
        self.field_rules(mode).iter().find(|rule| rule.field == field)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_mode(&self, mode: Mode) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(mode))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, mode: Mode) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(mode) {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

const fn rule(field: OptionField, inclusion: Inclusion, values: ValueRule) -> FieldRule {
    FieldRule {
        field,
        inclusion,
        values,
    }
}

const RESPONSE_FORMATS: ValueRule = ValueRule::OneOf(&["url", "b64_json"]);
const BACKGROUNDS: ValueRule = ValueRule::OneOf(&["auto", "transparent", "opaque"]);
const USER: FieldRule = rule(OptionField::User, Inclusion::NonEmpty, ValueRule::Text);

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      sizes: &[&'static str],
                      prompt_max_chars: usize,
                      max_n: u32,
                      edit_upload: Option<UploadRule>,
                      fields: Vec<(Mode, Vec<FieldRule>)>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                modes: fields.iter().map(|(mode, _)| *mode).collect(),
                sizes: sizes.to_vec(),
                prompt_max_chars,
                max_n,
                edit_upload,
                fields: fields.into_iter().collect(),
            },
        );
    };

    insert(
        "dall-e-2",
        &["1024x1024", "512x512", "256x256"],
        1000,
        10,
        Some(UploadRule {
            mime_types: &["image/png"],
            max_bytes: 4 * MB,
        }),
        vec![
            (
                Mode::Generate,
                vec![
                    rule(
                        OptionField::Quality,
                        Inclusion::Except("auto"),
                        ValueRule::OneOf(&["standard"]),
                    ),
                    rule(OptionField::ResponseFormat, Inclusion::Always, RESPONSE_FORMATS),
                    USER,
                ],
            ),
            (
                Mode::Edit,
                vec![rule(
                    OptionField::ResponseFormat,
                    Inclusion::Always,
                    RESPONSE_FORMATS,
                )],
            ),
            (
                Mode::Variation,
                vec![rule(
                    OptionField::ResponseFormat,
                    Inclusion::Always,
                    RESPONSE_FORMATS,
                )],
            ),
        ],
    );
    insert(
        "dall-e-3",
        &["1024x1024", "1792x1024", "1024x1792"],
        4000,
        1,
        None,
        vec![(
            Mode::Generate,
            vec![
                rule(
                    OptionField::Quality,
                    Inclusion::Except("auto"),
                    ValueRule::OneOf(&["hd", "standard"]),
                ),
                rule(OptionField::ResponseFormat, Inclusion::Always, RESPONSE_FORMATS),
                rule(
                    OptionField::Style,
                    Inclusion::Always,
                    ValueRule::OneOf(&["vivid", "natural"]),
                ),
                USER,
            ],
        )],
    );
    insert(
        "gpt-image-1",
        &["1024x1024", "1536x1024", "1024x1536", "auto"],
        32000,
        10,
        Some(UploadRule {
            mime_types: &["image/png", "image/jpeg", "image/webp"],
            max_bytes: 25 * MB,
        }),
        vec![
            (
                Mode::Generate,
                vec![
                    rule(
                        OptionField::Quality,
                        Inclusion::Except("auto"),
                        ValueRule::OneOf(&["high", "medium", "low"]),
                    ),
                    rule(OptionField::Background, Inclusion::Always, BACKGROUNDS),
                    rule(
                        OptionField::OutputFormat,
                        Inclusion::Always,
                        ValueRule::OneOf(&["png", "jpeg", "webp"]),
                    ),
                    rule(
                        OptionField::OutputCompression,
                        Inclusion::CompressedOutput,
                        ValueRule::Range(0, 100),
                    ),
                    rule(
                        OptionField::Moderation,
                        Inclusion::Always,
                        ValueRule::OneOf(&["auto", "low"]),
                    ),
                    USER,
                ],
            ),
            (
                Mode::Edit,
                vec![
                    rule(OptionField::Background, Inclusion::Always, BACKGROUNDS),
                    rule(
                        OptionField::Quality,
                        Inclusion::Always,
                        ValueRule::OneOf(&["auto", "high", "medium", "low"]),
                    ),
                ],
            ),
        ],
    );

    map
}
