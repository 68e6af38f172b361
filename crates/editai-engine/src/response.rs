use serde_json::Value;

use editai_contracts::chat::log::{ImageSet, ImageSource};

use crate::builder::ProviderRequest;
use crate::error::SubmitError;
use crate::transport::HttpReply;
use crate::util::truncate_text;

/// Maps a raw reply onto the chat's image shape or a user-facing error.
pub fn interpret_reply(request: &ProviderRequest, reply: &HttpReply) -> Result<ImageSet, SubmitError> {
    if !reply.is_success() {
        let message = error_message(&reply.body)
            .unwrap_or_else(|| request.endpoint.failure_message().to_string());
        return Err(SubmitError::Http {
            status: reply.status,
            message,
        });
    }
    let payload: Value = serde_json::from_str(&reply.body).map_err(|err| {
        SubmitError::Transport(format!(
            "{} returned invalid JSON: {err}",
            request.endpoint.path()
        ))
    })?;
    let sources = normalize_images(&payload, &request.inline_mime());
    ImageSet::from_sources(sources)
        .ok_or_else(|| SubmitError::EmptyResult(request.endpoint.empty_message().to_string()))
}

/// `error.message` from an API error body, if there is a non-blank one.
pub fn error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let message = match payload.get("error")? {
        Value::Object(error) => error.get("message")?.as_str()?,
        Value::String(message) => message.as_str(),
        _ => return None,
    };
    let message = message.trim();
    if message.is_empty() {
        return None;
    }
    Some(truncate_text(message, 512))
}

/// Each `data[]` row becomes its URL, or a data URI built from `b64_json`
/// when no URL is present. Rows with neither are skipped.
pub fn normalize_images(payload: &Value, inline_mime: &str) -> Vec<ImageSource> {
    let Some(rows) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(Value::as_object)
        .filter_map(|row| {
            if let Some(url) = row.get("url").and_then(Value::as_str) {
                if !url.trim().is_empty() {
                    return Some(ImageSource::Url(url.trim().to_string()));
                }
            }
            row.get("b64_json")
                .and_then(Value::as_str)
                .filter(|b64| !b64.trim().is_empty())
                .map(|b64| ImageSource::data_uri(inline_mime, b64.trim()))
        })
        .collect()
}
