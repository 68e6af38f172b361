use editai_contracts::models::{ModelSpec, UploadRule, MASK_UPLOAD, VARIATION_MAX_N, VARIATION_UPLOAD};
use editai_contracts::options::{Mode, RequestOptions};
use editai_contracts::uploads::{UploadedAsset, Uploads};

use crate::raster::probe_dimensions;

const MB: u64 = 1024 * 1024;

/// Local checks run before any request is built. The first failure wins and
/// its message is shown to the user as-is.
pub fn validate_submission(
    model: &ModelSpec,
    mode: Mode,
    options: &RequestOptions,
    prompt: &str,
    uploads: &Uploads,
) -> Result<(), String> {
    match mode {
        Mode::Generate => {
            check_prompt(model, prompt)?;
            check_n(options.n, model.max_n, || {
                format!(
                    "Number of images must be between 1 and {} for {}.",
                    model.max_n, model.name
                )
            })
        }
        Mode::Edit => {
            check_prompt(model, prompt)?;
            let image = uploads
                .image
                .as_ref()
                .ok_or_else(|| "Please upload an image to edit.".to_string())?;
            check_edit_image(model, image)?;
            if let Some(mask) = uploads.mask.as_ref() {
                check_mask(image, mask)?;
            }
            Ok(())
        }
        Mode::Variation => {
            let image = uploads
                .image
                .as_ref()
                .ok_or_else(|| "Please upload a PNG image for variation.".to_string())?;
            if !rule_admits_type(&VARIATION_UPLOAD, image) {
                return Err("Variation image must be a PNG file.".to_string());
            }
            if image.byte_len() > VARIATION_UPLOAD.max_bytes {
                return Err(format!(
                    "Variation image must be less than {}.",
                    megabytes(VARIATION_UPLOAD.max_bytes)
                ));
            }
            check_n(options.n, VARIATION_MAX_N, || {
                format!("Number of variations must be between 1 and {VARIATION_MAX_N}.")
            })?;
            let (width, height) = probe_dimensions(&image.bytes)
                .map_err(|_| "Variation image could not be read as a PNG.".to_string())?;
            if width != height {
                return Err("Variation image must be square (width = height).".to_string());
            }
            Ok(())
        }
    }
}

fn check_prompt(model: &ModelSpec, prompt: &str) -> Result<(), String> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err("Please enter a prompt.".to_string());
    }
    let chars = prompt.chars().count();
    if chars > model.prompt_max_chars {
        return Err(format!(
            "Prompt is {chars} characters; {} accepts at most {}.",
            model.name, model.prompt_max_chars
        ));
    }
    Ok(())
}

fn check_n(n: u32, max: u32, message: impl FnOnce() -> String) -> Result<(), String> {
    if (1..=max).contains(&n) {
        return Ok(());
    }
    Err(message())
}

fn check_edit_image(model: &ModelSpec, image: &UploadedAsset) -> Result<(), String> {
    let Some(rule) = model.edit_upload.as_ref() else {
        return Err(format!("{} does not support image edits.", model.name));
    };
    if !rule_admits_type(rule, image) {
        return Err(if rule.mime_types.len() == 1 {
            format!("{} requires a {} image.", model.name, type_labels(rule))
        } else {
            format!("{} supports {} images.", model.name, type_labels(rule))
        });
    }
    if image.byte_len() > rule.max_bytes {
        return Err(format!(
            "{} image must be less than {}.",
            model.name,
            megabytes(rule.max_bytes)
        ));
    }
    Ok(())
}

fn check_mask(image: &UploadedAsset, mask: &UploadedAsset) -> Result<(), String> {
    if !rule_admits_type(&MASK_UPLOAD, mask) {
        return Err("Mask must be a PNG file.".to_string());
    }
    if mask.byte_len() > MASK_UPLOAD.max_bytes {
        return Err(format!(
            "Mask must be less than {}.",
            megabytes(MASK_UPLOAD.max_bytes)
        ));
    }
    let mask_dims = probe_dimensions(&mask.bytes)
        .map_err(|_| "Mask could not be read as a PNG.".to_string())?;
    let image_dims = probe_dimensions(&image.bytes)
        .map_err(|_| "Image could not be read to compare with the mask.".to_string())?;
    if image_dims != mask_dims {
        return Err(format!(
            "Mask is {}x{} but the image is {}x{}; they must match.",
            mask_dims.0, mask_dims.1, image_dims.0, image_dims.1
        ));
    }
    Ok(())
}

fn rule_admits_type(rule: &UploadRule, asset: &UploadedAsset) -> bool {
    rule.mime_types
        .iter()
        .any(|mime| mime.eq_ignore_ascii_case(&asset.mime_type))
}

/// "PNG", "PNG or JPG", "PNG, JPG, or WEBP".
fn type_labels(rule: &UploadRule) -> String {
    let labels: Vec<&str> = rule
        .mime_types
        .iter()
        .map(|mime| match *mime {
            "image/png" => "PNG",
            "image/jpeg" => "JPG",
            "image/webp" => "WEBP",
            "image/gif" => "GIF",
            other => other,
        })
        .collect();
    match labels.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{first} or {second}"),
        [head @ .., last] => format!("{}, or {last}", head.join(", ")),
    }
}

fn megabytes(bytes: u64) -> String {
    format!("{}MB", bytes / MB)
}
