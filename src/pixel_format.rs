use anyhow::{Context, Result};

/// Parse one hex triad (no `0x` prefix) into a packed 0xRRGGBB value.
/// Bits above the low 24 are kept here and dropped on write.
pub fn parse_hex_pixel(token: &str) -> Result<u32> {
    u32::from_str_radix(token, 16)
        .with_context(|| format!("Invalid hex pixel token {:?}", token))
}

/// Split a packed 0xRRGGBB value into BMP byte order (B, G, R), ignoring
/// anything above bit 23
pub fn rgb_to_bgr(pixel: u32) -> [u8; 3] {
    let r = (pixel >> 16) as u8;
    let g = (pixel >> 8) as u8;
    let b = pixel as u8;
    [b, g, r]
}

/// Pack a whole row of pixels as BGR bytes
pub fn pixels_to_bgr(pixels: &[u32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(pixels.len() * 3);

    for &pixel in pixels {
        data.extend_from_slice(&rgb_to_bgr(pixel));
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_pixel() {
        assert_eq!(parse_hex_pixel("ff0000").unwrap(), 0xff0000);
        assert_eq!(parse_hex_pixel("0").unwrap(), 0);
        assert_eq!(parse_hex_pixel("ABCDEF").unwrap(), 0xabcdef);
    }

    #[test]
    fn test_parse_hex_pixel_rejects_garbage() {
        assert!(parse_hex_pixel("zz0000").is_err());
        assert!(parse_hex_pixel("").is_err());
        assert!(parse_hex_pixel("100000000").is_err()); // overflows u32
    }

    #[test]
    fn test_wide_token_keeps_low_24_bits() {
        let pixel = parse_hex_pixel("1000000").unwrap();
        assert_eq!(pixel, 0x1000000);
        assert_eq!(rgb_to_bgr(pixel), [0x00, 0x00, 0x00]);
        assert_eq!(rgb_to_bgr(0x12AABBCC), [0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_bgr_transform() {
        assert_eq!(rgb_to_bgr(0xAABBCC), [0xCC, 0xBB, 0xAA]);
        assert_eq!(rgb_to_bgr(0xff0000), [0x00, 0x00, 0xff]); // Red in BGR
    }

    #[test]
    fn test_row_to_bgr() {
        let row = [0xff0000, 0x00ff00, 0x0000ff, 0xffffff];
        assert_eq!(
            pixels_to_bgr(&row),
            vec![0x00, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0x00, 0xff, 0xff, 0xff]
        );
    }
}
