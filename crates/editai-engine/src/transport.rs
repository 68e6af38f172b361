use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::debug;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::builder::{FilePart, ProviderRequest, RequestBody};
use crate::config::ClientConfig;
use crate::raster::{format_for_output, parse_size, solid_image, solid_png};
use crate::util::{json_value_to_form_text, truncate_text};

/// Raw HTTP outcome. Status interpretation is left to the response module so
/// every transport shares one error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait ImageTransport: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, request: &ProviderRequest) -> Result<HttpReply>;
    /// Bytes behind an image URL returned by `send`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub fn transport_from_config(config: &ClientConfig) -> Result<Box<dyn ImageTransport>> {
    if config.dryrun {
        return Ok(Box::new(DryrunTransport));
    }
    Ok(Box::new(OpenAiTransport::new(config)?))
}

pub struct OpenAiTransport {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("OPENAI_API_KEY or OPENAI_API_KEY_BACKUP not set")
    }
}

impl ImageTransport for OpenAiTransport {
    fn name(&self) -> &str {
        "openai"
    }

    fn send(&self, request: &ProviderRequest) -> Result<HttpReply> {
        let api_key = self.api_key()?;
        let endpoint = format!("{}/{}", self.api_base, request.endpoint.path());
        let builder = self.http.post(&endpoint).bearer_auth(api_key);
        let builder = match &request.body {
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Multipart { fields, files } => {
                builder.multipart(multipart_form(fields, files)?)
            }
        };
        debug!("POST {endpoint} model={}", request.model);
        let response = builder
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("OpenAI response body read failed ({endpoint})"))?;
        debug!("{endpoint} answered {status} ({} bytes)", body.len());
        Ok(HttpReply { status, body })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading image ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!("image download failed ({code}): {}", truncate_text(&body, 512));
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading image bytes ({url})"))?;
        Ok(bytes.to_vec())
    }
}

fn multipart_form(fields: &[(String, Value)], files: &[FilePart]) -> Result<MultipartForm> {
    let mut form = MultipartForm::new();
    for part in files {
        let upload = MultipartPart::bytes(part.asset.bytes.to_vec())
            .file_name(part.asset.file_name.clone())
            .mime_str(&part.asset.mime_type)
            .with_context(|| {
                format!(
                    "invalid mime '{}' for {}",
                    part.asset.mime_type, part.asset.file_name
                )
            })?;
        form = form.part(part.field, upload);
    }
    for (key, value) in fields {
        form = form.text(key.clone(), json_value_to_form_text(value));
    }
    Ok(form)
}

const DRYRUN_SCHEME: &str = "dryrun://";

/// Answers every request locally with solid-colour images whose colour is
/// derived from the prompt (or the uploaded image for variations). URLs it
/// hands out encode everything `fetch` needs to rebuild the same image.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunTransport;

impl ImageTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn send(&self, request: &ProviderRequest) -> Result<HttpReply> {
        let seed_text = match request.param_text("prompt") {
            Some(prompt) => prompt,
            None => request
                .files()
                .first()
                .map(|part| hex::encode(Sha256::digest(&part.asset.bytes)))
                .unwrap_or_default(),
        };
        let count = request
            .param("n")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .max(1);
        let (width, height) = request
            .param_text("size")
            .and_then(|size| parse_size(&size))
            .unwrap_or((1024, 1024));
        let as_url = request.param_text("response_format").as_deref() == Some("url");
        let output_format = request
            .param_text("output_format")
            .unwrap_or_else(|| "png".to_string());

        let mut data = Vec::new();
        for idx in 0..count {
            let color = color_from_prompt(&seed_text, idx);
            if as_url {
                data.push(json!({
                    "url": format!(
                        "{DRYRUN_SCHEME}{}/{width}x{height}/{}.png",
                        short_id(&seed_text, idx),
                        hex::encode(color)
                    ),
                }));
            } else {
                let bytes =
                    solid_image(width, height, color, format_for_output(&output_format))?;
                data.push(json!({ "b64_json": BASE64.encode(bytes) }));
            }
        }
        let body = json!({
            "created": dryrun_created(&seed_text),
            "data": data,
        });
        Ok(HttpReply {
            status: 200,
            body: serde_json::to_string(&body)?,
        })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let Some(rest) = url.strip_prefix(DRYRUN_SCHEME) else {
            bail!("dryrun transport cannot fetch {url}");
        };
        let mut segments = rest.split('/').skip(1);
        let (width, height) = segments
            .next()
            .and_then(parse_size)
            .with_context(|| format!("malformed dryrun url {url}"))?;
        let color_hex = segments
            .next()
            .and_then(|name| name.strip_suffix(".png"))
            .with_context(|| format!("malformed dryrun url {url}"))?;
        let raw = hex::decode(color_hex).with_context(|| format!("malformed dryrun url {url}"))?;
        let color: [u8; 3] = raw
            .as_slice()
            .try_into()
            .with_context(|| format!("malformed dryrun url {url}"))?;
        solid_png(width, height, color)
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> [u8; 3] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2]]
}

fn short_id(prompt: &str, idx: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(idx.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

/// Stable stand-in for the API's `created` timestamp so dry-run replies are
/// reproducible.
fn dryrun_created(seed_text: &str) -> u64 {
    let digest = Sha256::digest(seed_text.as_bytes());
    u64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use editai_contracts::models::ModelRegistry;
    use editai_contracts::options::{Mode, OptionField, RequestOptions};
    use editai_contracts::uploads::Uploads;

    use super::{DryrunTransport, ImageTransport};
    use crate::builder::build_request;
    use crate::raster::probe_dimensions;

    fn generate(pairs: &[(OptionField, &str)]) -> anyhow::Result<crate::builder::ProviderRequest> {
        let mut options = RequestOptions::default();
        for (field, value) in pairs {
            options.set(*field, value).map_err(anyhow::Error::msg)?;
        }
        let registry = ModelRegistry::default();
        let model = registry
            .get(&options.model)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing model"))?;
        build_request(&model, Mode::Generate, &options, "a red ball", &Uploads::default())
            .map_err(anyhow::Error::msg)
    }

    #[test]
    fn dryrun_urls_round_trip_through_fetch() -> anyhow::Result<()> {
        let request = generate(&[(OptionField::N, "2"), (OptionField::Size, "256x256")])?;
        let reply = DryrunTransport.send(&request)?;
        assert!(reply.is_success());
        let payload: Value = serde_json::from_str(&reply.body)?;
        let urls: Vec<&str> = payload["data"]
            .as_array()
            .map(|rows| rows.iter().filter_map(|row| row["url"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(urls.len(), 2);
        assert_ne!(urls[0], urls[1]);

        let bytes = DryrunTransport.fetch(urls[0])?;
        assert_eq!(probe_dimensions(&bytes)?, (256, 256));
        assert!(DryrunTransport.fetch("https://example.com/a.png").is_err());
        Ok(())
    }

    #[test]
    fn dryrun_inline_results_are_deterministic() -> anyhow::Result<()> {
        let request = generate(&[(OptionField::Model, "gpt-image-1")])?;
        let first = DryrunTransport.send(&request)?;
        let second = DryrunTransport.send(&request)?;
        assert_eq!(first, second);
        let payload: Value = serde_json::from_str(&first.body)?;
        assert!(payload["data"][0]["b64_json"].is_string());
        Ok(())
    }
}
