//! Image encoding: extracted PNG file → base64 `ImageData` for a model call.
//!
//! Extracted images are already written as PNG, so the file bytes are sent
//! as-is; re-encoding through `image` would only cost time.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

use crate::output::ExtractedImage;

/// Read a PNG file and wrap it for the multimodal request body.
pub fn encode_png_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = std::fs::read(path)?;
    Ok(encode_png_bytes(&bytes))
}

pub fn encode_png_bytes(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/png").with_detail("high")
}

/// Encode every image that can still be read, skipping (and logging) the rest.
///
/// Returns the encoded payloads together with the filenames they belong to,
/// in input order, so prompts can list exactly what was attached.
pub fn encode_images<'a, I>(images: I) -> (Vec<ImageData>, Vec<String>)
where
    I: IntoIterator<Item = &'a ExtractedImage>,
{
    let mut data = Vec::new();
    let mut names = Vec::new();
    for img in images {
        match encode_png_file(&img.path) {
            Ok(d) => {
                data.push(d);
                names.push(img.filename.clone());
            }
            Err(e) => tracing::warn!("Skipping unreadable image {}: {}", img.filename, e),
        }
    }
    (data, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str) -> ExtractedImage {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(120, 120, Rgba([0, 0, 255, 255])));
        let path = dir.join(name);
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        ExtractedImage {
            filename: name.to_string(),
            path,
            page: 1,
            width: 120,
            height: 120,
        }
    }

    #[test]
    fn encode_file_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let img = write_png(dir.path(), "page_1_img_0.png");
        let data = encode_png_file(&img.path).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert_eq!(decoded, std::fs::read(&img.path).unwrap());
    }

    #[test]
    fn unreadable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), "page_1_img_0.png");
        let mut missing = good.clone();
        missing.filename = "page_1_img_1.png".into();
        missing.path = dir.path().join("page_1_img_1.png");

        let (data, names) = encode_images([&good, &missing]);
        assert_eq!(data.len(), 1);
        assert_eq!(names, vec!["page_1_img_0.png"]);
    }
}
