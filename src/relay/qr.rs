use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// PNG-encoded QR code for `url`.
pub fn qr_png(url: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(url.as_bytes()).context("encode qr payload")?;
    let img = code.render::<Luma<u8>>().module_dimensions(10, 10).build();
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, ImageFormat::Png)
        .context("encode qr png")?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_png_with_ten_pixel_modules() {
        let png = qr_png("http://192.168.1.20:5000/phone").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % 10, 0);
    }
}
