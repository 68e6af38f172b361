use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Generate,
    Edit,
    Variation,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Generate, Mode::Edit, Mode::Variation];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Generate => "generate",
            Mode::Edit => "edit",
            Mode::Variation => "variation",
        }
    }

    pub fn requires_prompt(self) -> bool {
        !matches!(self, Mode::Variation)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generate" | "gen" => Ok(Mode::Generate),
            "edit" => Ok(Mode::Edit),
            "variation" | "variations" | "vary" => Ok(Mode::Variation),
            other => Err(format!(
                "Unknown mode '{other}'; expected generate, edit or variation."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionField {
    Model,
    N,
    Size,
    Quality,
    Background,
    OutputFormat,
    OutputCompression,
    Moderation,
    Style,
    ResponseFormat,
    User,
}

impl OptionField {
    pub const ALL: [OptionField; 11] = [
        OptionField::Model,
        OptionField::N,
        OptionField::Size,
        OptionField::Quality,
        OptionField::Background,
        OptionField::OutputFormat,
        OptionField::OutputCompression,
        OptionField::Moderation,
        OptionField::Style,
        OptionField::ResponseFormat,
        OptionField::User,
    ];

    /// Wire name, shared by the option store and the request payload.
    pub fn as_str(self) -> &'static str {
        match self {
            OptionField::Model => "model",
            OptionField::N => "n",
            OptionField::Size => "size",
            OptionField::Quality => "quality",
            OptionField::Background => "background",
            OptionField::OutputFormat => "output_format",
            OptionField::OutputCompression => "output_compression",
            OptionField::Moderation => "moderation",
            OptionField::Style => "style",
            OptionField::ResponseFormat => "response_format",
            OptionField::User => "user",
        }
    }
}

impl fmt::Display for OptionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionField {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_lowercase().replace('-', "_");
        OptionField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| format!("Unknown option '{}'.", raw.trim()))
    }
}

/// Mode-scoped option record. Every field is held regardless of the selected
/// model; the request builder decides which ones go on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub model: String,
    pub n: u32,
    pub size: String,
    pub quality: String,
    pub background: String,
    pub output_format: String,
    pub output_compression: u32,
    pub moderation: String,
    pub style: String,
    pub response_format: String,
    pub user: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            model: "dall-e-2".to_string(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: "auto".to_string(),
            background: "auto".to_string(),
            output_format: "png".to_string(),
            output_compression: 100,
            moderation: "auto".to_string(),
            style: "vivid".to_string(),
            response_format: "url".to_string(),
            user: String::new(),
        }
    }
}

impl RequestOptions {
    pub fn get(&self, field: OptionField) -> Value {
        match field {
            OptionField::Model => Value::String(self.model.clone()),
            OptionField::N => Value::Number(self.n.into()),
            OptionField::Size => Value::String(self.size.clone()),
            OptionField::Quality => Value::String(self.quality.clone()),
            OptionField::Background => Value::String(self.background.clone()),
            OptionField::OutputFormat => Value::String(self.output_format.clone()),
            OptionField::OutputCompression => Value::Number(self.output_compression.into()),
            OptionField::Moderation => Value::String(self.moderation.clone()),
            OptionField::Style => Value::String(self.style.clone()),
            OptionField::ResponseFormat => Value::String(self.response_format.clone()),
            OptionField::User => Value::String(self.user.clone()),
        }
    }

    /// Stores a raw text value. Only the shape is checked here (numbers must
    /// parse); whether the value suits the model is the builder's concern.
    pub fn set(&mut self, field: OptionField, raw: &str) -> Result<(), String> {
        let trimmed = raw.trim();
        match field {
            OptionField::N => {
                self.n = trimmed
                    .parse::<u32>()
                    .map_err(|_| format!("Option 'n' expects a whole number, got '{trimmed}'."))?;
            }
            OptionField::OutputCompression => {
                self.output_compression = trimmed.parse::<u32>().map_err(|_| {
                    format!("Option 'output_compression' expects a whole number, got '{trimmed}'.")
                })?;
            }
            OptionField::User => self.user = raw.to_string(),
            OptionField::Model => self.model = trimmed.to_ascii_lowercase(),
            OptionField::Size => self.size = trimmed.to_ascii_lowercase(),
            OptionField::Quality => self.quality = trimmed.to_ascii_lowercase(),
            OptionField::Background => self.background = trimmed.to_ascii_lowercase(),
            OptionField::OutputFormat => self.output_format = normalize_format(trimmed),
            OptionField::Moderation => self.moderation = trimmed.to_ascii_lowercase(),
            OptionField::Style => self.style = trimmed.to_ascii_lowercase(),
            OptionField::ResponseFormat => self.response_format = trimmed.to_ascii_lowercase(),
        }
        Ok(())
    }

    pub fn to_map(&self) -> Map<String, Value> {
        OptionField::ALL
            .iter()
            .map(|field| (field.as_str().to_string(), self.get(*field)))
            .collect()
    }
}

fn normalize_format(raw: &str) -> String {
    let lowered = raw.to_ascii_lowercase();
    let stripped = lowered.strip_prefix("image/").unwrap_or(&lowered);
    match stripped {
        "jpg" => "jpeg".to_string(),
        other => other.to_string(),
    }
}
