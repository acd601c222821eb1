use anyhow::{Context, Result};
use std::io::{BufRead, ErrorKind};
use tracing::warn;

use crate::pixel_format::parse_hex_pixel;

/// Outcome of reading one frame line from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete row of packed 0xRRGGBB pixels
    Row(Vec<u32>),
    /// Wrong token count; the caller should read another line
    Incomplete { tokens: usize },
    /// The transport reached end of stream
    Closed,
}

/// Read one newline-terminated line of hex pixels.
///
/// A read timeout ends the line early with whatever bytes already arrived,
/// which usually shows up as `Incomplete`. Non-ASCII bytes are dropped.
/// A token that is not valid hex is an error.
pub fn read_pixel_line<R: BufRead>(reader: &mut R, width: usize) -> Result<LineRead> {
    let mut raw = Vec::new();

    match reader.read_until(b'\n', &mut raw) {
        Ok(0) => return Ok(LineRead::Closed),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::TimedOut => {}
        Err(e) => return Err(e).context("Failed to read line from serial port"),
    }

    let line: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();

    let tokens: Vec<&str> = line
        .split(is_separator)
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.len() != width {
        warn!("Line received: {}/{} values", tokens.len(), width);
        return Ok(LineRead::Incomplete { tokens: tokens.len() });
    }

    let pixels = tokens
        .iter()
        .map(|token| parse_hex_pixel(token))
        .collect::<Result<Vec<u32>>>()?;

    Ok(LineRead::Row(pixels))
}

/// Whitespace plus the ASCII file/group/record/unit separators
fn is_separator(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, BufReader, Cursor, Read};

    #[test]
    fn test_full_row() {
        let mut input = Cursor::new(b"ff0000 00ff00 0000ff ffffff\r\n".to_vec());
        assert_eq!(
            read_pixel_line(&mut input, 4).unwrap(),
            LineRead::Row(vec![0xff0000, 0x00ff00, 0x0000ff, 0xffffff])
        );
    }

    #[test]
    fn test_short_row_is_incomplete() {
        let mut input = Cursor::new(b"ff0000 00ff00 0000ff\n".to_vec());
        assert_eq!(
            read_pixel_line(&mut input, 4).unwrap(),
            LineRead::Incomplete { tokens: 3 }
        );
    }

    #[test]
    fn test_extra_whitespace_and_non_ascii() {
        let mut input = Cursor::new(b"  \t1a2b3c \xff\xfe  000001\n".to_vec());
        assert_eq!(
            read_pixel_line(&mut input, 2).unwrap(),
            LineRead::Row(vec![0x1a2b3c, 0x000001])
        );
    }

    #[test]
    fn test_control_separators_split_tokens() {
        let mut input = Cursor::new(b"ff0000\x1f00ff00\x1c0000ff\n".to_vec());
        assert_eq!(
            read_pixel_line(&mut input, 3).unwrap(),
            LineRead::Row(vec![0xff0000, 0x00ff00, 0x0000ff])
        );
    }

    #[test]
    fn test_wide_token_is_kept() {
        let mut input = Cursor::new(b"1000000 0000ff\n".to_vec());
        assert_eq!(
            read_pixel_line(&mut input, 2).unwrap(),
            LineRead::Row(vec![0x1000000, 0xff])
        );
    }

    #[test]
    fn test_bad_hex_is_an_error() {
        let mut input = Cursor::new(b"ff0000 nothex\n".to_vec());
        assert!(read_pixel_line(&mut input, 2).is_err());
    }

    #[test]
    fn test_end_of_stream() {
        let mut input = Cursor::new(Vec::new());
        assert_eq!(read_pixel_line(&mut input, 4).unwrap(), LineRead::Closed);
    }

    #[test]
    fn test_successive_lines() {
        let mut input = Cursor::new(b"01 02\n03\n04 05\n".to_vec());
        assert_eq!(read_pixel_line(&mut input, 2).unwrap(), LineRead::Row(vec![1, 2]));
        assert_eq!(read_pixel_line(&mut input, 2).unwrap(), LineRead::Incomplete { tokens: 1 });
        assert_eq!(read_pixel_line(&mut input, 2).unwrap(), LineRead::Row(vec![4, 5]));
    }

    /// Yields its data once, then times out like an idle serial port
    struct TimeoutAfter {
        data: Cursor<Vec<u8>>,
    }

    impl Read for TimeoutAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_timeout_keeps_partial_line() {
        let mut input = BufReader::new(TimeoutAfter {
            data: Cursor::new(b"ff0000 00ff".to_vec()),
        });
        assert_eq!(
            read_pixel_line(&mut input, 4).unwrap(),
            LineRead::Incomplete { tokens: 2 }
        );
        // Idle port: empty line, not end of stream
        assert_eq!(
            read_pixel_line(&mut input, 4).unwrap(),
            LineRead::Incomplete { tokens: 0 }
        );
    }
}
