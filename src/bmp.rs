use anyhow::{Context, Result};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::pixel_format::pixels_to_bgr;

/// Byte position of the pixel-data offset field in the file header
const PIXEL_OFFSET_FIELD: u64 = 10;
/// BITMAPFILEHEADER, followed by the DIB header size field
const FILE_HEADER_SIZE: usize = 14;
/// BITMAPINFOHEADER and later carry width/height/bit depth at fixed positions
const INFO_HEADER_MIN_SIZE: u32 = 40;

/// Row geometry of a 24-bit BMP pixel array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub width: usize,
}

impl RowLayout {
    pub fn new(width: usize) -> Self {
        RowLayout { width }
    }

    /// Bytes of pixel data per row, before padding
    pub fn stride(&self) -> usize {
        self.width * 3
    }

    /// Zero bytes needed to align a row on 4 bytes
    pub fn padding(&self) -> usize {
        (4 - self.stride() % 4) % 4
    }

    /// Stored bytes per row
    pub fn row_size(&self) -> usize {
        self.stride() + self.padding()
    }

    /// Absolute file offset of a row, counted from the bottom of the image
    pub fn row_offset(&self, pixel_offset: u64, row_index: usize) -> u64 {
        pixel_offset + (row_index * self.row_size()) as u64
    }
}

/// Read the 4-byte little-endian pixel-data offset at byte 10
pub fn read_pixel_offset<R: Read + Seek>(file: &mut R) -> Result<u64> {
    file.seek(SeekFrom::Start(PIXEL_OFFSET_FIELD))
        .context("Failed to seek to BMP pixel offset field")?;

    let mut field = [0u8; 4];
    file.read_exact(&mut field)
        .context("BMP file too short to hold a pixel offset")?;

    Ok(u32::from_le_bytes(field) as u64)
}

/// Write one row of 0xRRGGBB pixels as BGR bytes plus zero padding.
///
/// No bounds checking is done against the file size or the header geometry;
/// writing past the end grows the file.
pub fn write_row<W: Write + Seek>(
    file: &mut W,
    pixel_offset: u64,
    row_index: usize,
    pixels: &[u32],
    layout: RowLayout,
) -> Result<()> {
    let offset = layout.row_offset(pixel_offset, row_index);
    file.seek(SeekFrom::Start(offset))
        .with_context(|| format!("Failed to seek to row {} at byte {}", row_index, offset))?;

    let mut data = pixels_to_bgr(pixels);
    data.resize(data.len() + layout.padding(), 0);

    file.write_all(&data)
        .with_context(|| format!("Failed to write row {}", row_index))?;

    Ok(())
}

/// Header fields of interest in an existing BMP file.
///
/// Only the pixel offset is required; everything else is read when present
/// so mismatches can be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpHeader {
    pub pixel_offset: u64,
    pub signature: [u8; 2],
    /// Size of the DIB header, if the file is long enough to hold the field
    pub dib_size: Option<u32>,
    /// Declared geometry, when the DIB header is BITMAPINFOHEADER or later
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: i32,
    /// Positive for bottom-up images, negative for top-down
    pub height: i32,
    pub bits_per_pixel: u16,
}

/// Fill `buf` from `pos`, returning false when the file ends first
fn read_optional<R: Read + Seek>(file: &mut R, pos: u64, buf: &mut [u8]) -> Result<bool> {
    file.seek(SeekFrom::Start(pos))
        .context("Failed to seek in BMP header")?;

    match file.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e).context("Failed to read BMP header"),
    }
}

impl BmpHeader {
    pub fn read<R: Read + Seek>(file: &mut R) -> Result<Self> {
        let pixel_offset = read_pixel_offset(file)?;

        // The offset field ends at byte 14, so the signature is always there
        let mut signature = [0u8; 2];
        read_optional(file, 0, &mut signature)?;

        let mut field = [0u8; 4];
        let dib_size = if read_optional(file, FILE_HEADER_SIZE as u64, &mut field)? {
            Some(u32::from_le_bytes(field))
        } else {
            None
        };

        let mut geometry = None;
        if dib_size.is_some_and(|size| size >= INFO_HEADER_MIN_SIZE) {
            let mut info = [0u8; 12];
            if read_optional(file, FILE_HEADER_SIZE as u64 + 4, &mut info)? {
                geometry = Some(Geometry {
                    width: i32::from_le_bytes([info[0], info[1], info[2], info[3]]),
                    height: i32::from_le_bytes([info[4], info[5], info[6], info[7]]),
                    bits_per_pixel: u16::from_le_bytes([info[10], info[11]]),
                });
            }
        }

        Ok(BmpHeader {
            pixel_offset,
            signature,
            dib_size,
            geometry,
        })
    }

    /// Describe every way the header differs from a 24-bit bottom-up BMP of
    /// `width` x `height`. Empty when they agree.
    pub fn check_geometry(&self, width: usize, height: usize) -> Vec<String> {
        let mut problems = Vec::new();

        if &self.signature != b"BM" {
            problems.push(format!(
                "signature {:02x} {:02x} is not BM",
                self.signature[0], self.signature[1]
            ));
        }

        let Some(geometry) = self.geometry else {
            match self.dib_size {
                None => problems.push("file ends before the DIB header".to_string()),
                Some(size) if size < INFO_HEADER_MIN_SIZE => problems.push(format!(
                    "DIB header of {} bytes carries no width/height",
                    size
                )),
                Some(_) => problems.push("DIB header truncated".to_string()),
            }
            return problems;
        };

        if geometry.width as i64 != width as i64 {
            problems.push(format!("header width {} != configured {}", geometry.width, width));
        }
        if geometry.height < 0 {
            problems.push(format!(
                "header height {} is top-down, rows would land upside down",
                geometry.height
            ));
        }
        if geometry.height.unsigned_abs() as usize != height {
            problems.push(format!(
                "header height {} != configured {}",
                geometry.height.unsigned_abs(),
                height
            ));
        }
        if geometry.bits_per_pixel != 24 {
            problems.push(format!("header bit depth {} != 24", geometry.bits_per_pixel));
        }

        problems
    }
}

/// Build a blank 24-bit bottom-up BMP image, used by tests
#[cfg(test)]
pub fn blank_bmp(width: usize, height: usize) -> Vec<u8> {
    let layout = RowLayout::new(width);
    let pixel_offset = 54u32;
    let image_size = (layout.row_size() * height) as u32;

    let mut data = Vec::new();
    data.extend_from_slice(b"BM");
    data.extend_from_slice(&(pixel_offset + image_size).to_le_bytes());
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(&pixel_offset.to_le_bytes());
    data.extend_from_slice(&40u32.to_le_bytes());
    data.extend_from_slice(&(width as i32).to_le_bytes());
    data.extend_from_slice(&(height as i32).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes()); // planes
    data.extend_from_slice(&24u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    data.extend_from_slice(&image_size.to_le_bytes());
    data.extend_from_slice(&2835i32.to_le_bytes());
    data.extend_from_slice(&2835i32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());
    data.resize(data.len() + image_size as usize, 0);
    data
}
