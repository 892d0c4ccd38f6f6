//! Screenshot encoding shared by both backends.

use std::io::Cursor;

use anyhow::{Context, Result};
use image::ImageFormat;
use tracing::debug;

/// Ensure screenshot bytes are PNG, re-encoding other raster formats.
pub fn normalize_png(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let format = image::guess_format(&bytes).context("unrecognized screenshot format")?;
    if format == ImageFormat::Png {
        return Ok(bytes);
    }
    debug!(?format, "re-encoding screenshot as png");
    let img = image::load_from_memory_with_format(&bytes, format).context("decode screenshot")?;
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .context("encode screenshot as png")?;
    Ok(buf.into_inner())
}

#[cfg(test)]
pub(crate) fn encoded_fixture(format: ImageFormat) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(
        4,
        3,
        image::Rgb([200u8, 40, 40]),
    ));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).expect("encode fixture");
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_passes_through_unchanged() {
        let png = encoded_fixture(ImageFormat::Png);
        assert_eq!(normalize_png(png.clone()).expect("png"), png);
    }

    #[test]
    fn jpeg_is_reencoded_as_png() {
        let converted = normalize_png(encoded_fixture(ImageFormat::Jpeg)).expect("jpeg");
        assert_eq!(image::guess_format(&converted).expect("guess"), ImageFormat::Png);
        let decoded = image::load_from_memory(&converted).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn non_images_are_rejected() {
        assert!(normalize_png(b"not an image".to_vec()).is_err());
    }
}
