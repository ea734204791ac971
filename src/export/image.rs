//! Texture payload preparation for embedding in exported files.

use crate::error::Result;
use image::{DynamicImage, ImageFormat};
use log::warn;
use std::io::Cursor;
use std::path::Path;

/// Image bytes ready to embed, with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub has_alpha: bool,
}

/// Prepare embedded texture content for a glTF buffer.
///
/// PNG and JPEG pass through unchanged; anything else the `image` crate can
/// decode is re-encoded as PNG. Undecodable content is skipped with a warning.
/// `name` is a filename hint used when the format can't be sniffed.
pub fn encode_embedded(bytes: &[u8], name: Option<&str>) -> Option<EncodedImage> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => {
            let has_alpha = image::load_from_memory_with_format(bytes, ImageFormat::Png)
                .map(|image| image.color().has_alpha())
                .unwrap_or(false);
            return Some(EncodedImage {
                bytes: bytes.to_vec(),
                mime_type: "image/png",
                has_alpha,
            });
        }
        Ok(ImageFormat::Jpeg) => {
            return Some(EncodedImage {
                bytes: bytes.to_vec(),
                mime_type: "image/jpeg",
                has_alpha: false,
            });
        }
        _ => {}
    }

    let decoded = image::load_from_memory(bytes).or_else(|err| {
        match name.and_then(format_from_name) {
            Some(format) => image::load_from_memory_with_format(bytes, format),
            None => Err(err),
        }
    });

    match decoded.map_err(Into::into).and_then(encode_png) {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(
                "Could not decode texture {}: {}",
                name.unwrap_or("<unnamed>"),
                err
            );
            None
        }
    }
}

/// MIME type implied by a texture path's extension, if it is a web format.
pub fn mime_from_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

fn format_from_name(name: &str) -> Option<ImageFormat> {
    let ext = Path::new(name).extension()?.to_str()?;
    ImageFormat::from_extension(ext)
}

fn encode_png(image: DynamicImage) -> Result<EncodedImage> {
    let has_alpha = image.color().has_alpha();
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(EncodedImage {
        bytes,
        mime_type: "image/png",
        has_alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn encoded(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn test_png_passes_through() {
        let png = encoded(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]))),
            ImageFormat::Png,
        );
        let image = encode_embedded(&png, Some("red.png")).unwrap();
        assert_eq!(image.bytes, png);
        assert_eq!(image.mime_type, "image/png");
        assert!(image.has_alpha);
    }

    #[test]
    fn test_bmp_is_reencoded_as_png() {
        let bmp = encoded(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 255, 0]))),
            ImageFormat::Bmp,
        );
        let image = encode_embedded(&bmp, None).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image::guess_format(&image.bytes).unwrap(), ImageFormat::Png);
        assert!(!image.has_alpha);
    }

    #[test]
    fn test_garbage_is_skipped() {
        assert!(encode_embedded(b"definitely not an image", Some("x.bin")).is_none());
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path("tex/albedo.PNG"), Some("image/png"));
        assert_eq!(mime_from_path("a.jpeg"), Some("image/jpeg"));
        assert_eq!(mime_from_path("a.tga"), None);
        assert_eq!(mime_from_path("noext"), None);
    }
}
