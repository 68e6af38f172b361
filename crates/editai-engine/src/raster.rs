use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage, RgbaImage};

/// Width and height read from the image header, format sniffed from the bytes.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed reading image header")?
        .into_dimensions()
        .context("unsupported or corrupt image")
}

pub fn encode_png(image: DynamicImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .context("failed encoding PNG")?;
    Ok(out.into_inner())
}

pub fn encode_rgba_png(width: u32, height: u32, pixels: Vec<u8>) -> Result<Vec<u8>> {
    let buffer = RgbaImage::from_raw(width, height, pixels)
        .with_context(|| format!("pixel buffer does not match {width}x{height}"))?;
    encode_png(DynamicImage::ImageRgba8(buffer))
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Result<Vec<u8>> {
    solid_image(width, height, color, ImageFormat::Png)
}

pub fn solid_image(width: u32, height: u32, color: [u8; 3], format: ImageFormat) -> Result<Vec<u8>> {
    let buffer = RgbImage::from_pixel(width, height, Rgb(color));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut out, format)
        .with_context(|| format!("failed encoding {format:?}"))?;
    Ok(out.into_inner())
}

/// Encoder for an `output_format` value; unknown values fall back to PNG.
pub fn format_for_output(output_format: &str) -> ImageFormat {
    match output_format {
        "jpeg" | "jpg" => ImageFormat::Jpeg,
        "webp" => ImageFormat::WebP,
        _ => ImageFormat::Png,
    }
}

/// `"1024x768"` -> `(1024, 768)`. Anything else, including `"auto"`, is `None`.
pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (width, height) = size.trim().split_once('x')?;
    let width = width.parse::<u32>().ok()?;
    let height = height.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
