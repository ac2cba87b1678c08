use image::ImageFormat;
use uuid::Uuid;

pub const RECIPE_IMAGE_PREFIX: &str = "upload/recipe";

const MAX_EXT_LEN: usize = 10;

/// Detects the image format and fully decodes the bytes to prove they are an image.
pub fn detect_image(bytes: &[u8]) -> Result<ImageFormat, image::ImageError> {
    let format = image::guess_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)?;
    Ok(format)
}

/// Fresh storage key for a recipe image: `upload/recipe/<uuid>.<ext>`.
///
/// Keeps the uploaded file's extension when it is a plain alphanumeric
/// suffix, otherwise falls back to the detected format's extension.
pub fn recipe_image_key(original_name: Option<&str>, format: ImageFormat) -> String {
    let ext = original_name
        .and_then(sanitized_extension)
        .unwrap_or_else(|| default_extension(format).to_string());
    format!("{}/{}.{}", RECIPE_IMAGE_PREFIX, Uuid::new_v4(), ext)
}

pub fn content_type(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}

fn default_extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

fn sanitized_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXT_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(10, 10, image::Rgb([200, 40, 40]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
