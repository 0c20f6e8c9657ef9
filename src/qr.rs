//! QR codes for verification links.

use crate::{Error, Result};
use qrcode::{Color, EcLevel, QrCode};

/// Light modules around the symbol.
pub const QUIET_ZONE: usize = 1;
/// Smallest rendered edge in pixels.
pub const MIN_SIZE_PX: usize = 150;

/// Render `content` as an 8 bit grayscale PNG with error correction level H.
/// The output is the same for the same input.
pub fn generate_png(content: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::H)
        .map_err(|err| Error::validation(format!("Can not encode QR code: {}", err)))?;
    let modules = code.width();
    let colors = code.to_colors();

    let total_modules = modules + 2 * QUIET_ZONE;
    let scale = ((MIN_SIZE_PX + total_modules - 1) / total_modules).max(1);
    let size = total_modules * scale;

    let mut pixels = vec![255u8; size * size];
    for (index, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let (row, col) = (index / modules + QUIET_ZONE, index % modules + QUIET_ZONE);
        for y in row * scale..(row + 1) * scale {
            let line = y * size;
            pixels[line + col * scale..line + (col + 1) * scale].fill(0);
        }
    }

    let side = u32::try_from(size)?;
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, side, side);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
        writer.finish()?;
    }
    log::debug!(
        "Rendered QR code with {} modules at {} px for {} bytes of content",
        modules,
        size,
        content.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_is_a_large_enough_grayscale_png() {
        let png = generate_png("http://localhost:5556/verify/abc").unwrap();
        let decoder = png::Decoder::new(png.as_slice());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!(info.width, info.height);
        assert!(info.width as usize >= MIN_SIZE_PX);
        assert_eq!(info.color_type, png::ColorType::Grayscale);
    }

    #[test]
    fn test_qr_is_deterministic() {
        let url = "https://sign.example.com/verify/123";
        assert_eq!(generate_png(url).unwrap(), generate_png(url).unwrap());
        assert_ne!(
            generate_png(url).unwrap(),
            generate_png("https://sign.example.com/verify/124").unwrap()
        );
    }

    #[test]
    fn test_quiet_zone_is_white() {
        let png = generate_png("x").unwrap();
        let mut reader = png::Decoder::new(png.as_slice()).read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        reader.next_frame(&mut buf).unwrap();
        // First row belongs to the quiet zone.
        let width = reader.info().width as usize;
        assert!(buf[..width].iter().all(|pixel| *pixel == 255));
    }
}
