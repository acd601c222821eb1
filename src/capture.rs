use anyhow::{Context, Result};
use serialport::SerialPort;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

use crate::bmp::{write_row, BmpHeader, RowLayout};
use crate::config::{CaptureConfig, Config, ImageConfig};
use crate::line_reader::{read_pixel_line, LineRead};
use crate::serial::open_port;

/// What a capture run achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    pub rows_written: usize,
    pub lines_discarded: usize,
    /// Stopped by Ctrl-C before every row arrived
    pub cancelled: bool,
}

/// Streams framebuffer lines from a reader into the rows of a BMP file.
///
/// Both the line source and the file are owned, so they are released on
/// every exit path when the capture is dropped.
pub struct Capture<R, F> {
    reader: R,
    file: F,
    header: BmpHeader,
    layout: RowLayout,
    height: usize,
    max_retries: u32,
    running: Arc<AtomicBool>,
}

/// Open the serial port and BMP file named in the configuration
pub fn open(config: &Config) -> Result<Capture<BufReader<Box<dyn SerialPort>>, File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.image.path)
        .with_context(|| format!("Failed to open BMP file {}", config.image.path.display()))?;

    let port = open_port(&config.serial)?;

    Capture::new(BufReader::new(port), file, &config.image, &config.capture)
}

impl<R: BufRead, F: Read + Write + Seek> Capture<R, F> {
    /// Read the BMP header and check it against the configured geometry
    pub fn new(
        reader: R,
        mut file: F,
        image: &ImageConfig,
        capture: &CaptureConfig,
    ) -> Result<Self> {
        let header = BmpHeader::read(&mut file)?;

        let problems = header.check_geometry(image.width, image.height);
        if !problems.is_empty() {
            if capture.strict_header {
                anyhow::bail!("BMP header does not match capture: {}", problems.join("; "));
            }
            for problem in &problems {
                warn!("BMP header: {}", problem);
            }
        }

        Ok(Capture {
            reader,
            file,
            header,
            layout: RowLayout::new(image.width),
            height: image.height,
            max_retries: capture.max_retries,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Get a clone of the running flag for signal handlers
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn pixel_offset(&self) -> u64 {
        self.header.pixel_offset
    }

    /// Receive `height` rows, bottom row first, writing each as it arrives
    pub fn run(&mut self) -> Result<CaptureSummary> {
        let mut summary = CaptureSummary {
            rows_written: 0,
            lines_discarded: 0,
            cancelled: false,
        };

        for row in 0..self.height {
            let pixels = match self.next_row(row, &mut summary) {
                Ok(Some(pixels)) => pixels,
                Ok(None) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    return Err(e).context(format!(
                        "Capture aborted after {}/{} rows",
                        summary.rows_written, self.height
                    ));
                }
            };

            if let Err(e) = self.store_row(row, &pixels) {
                return Err(e).context(format!(
                    "Capture aborted after {}/{} rows",
                    summary.rows_written, self.height
                ));
            }

            summary.rows_written += 1;
            println!("✓ Line {}/{} written to BMP", row + 1, self.height);
        }

        Ok(summary)
    }

    fn store_row(&mut self, row: usize, pixels: &[u32]) -> Result<()> {
        write_row(&mut self.file, self.header.pixel_offset, row, pixels, self.layout)?;
        // Keep completed rows on disk if the capture dies later
        self.file.flush().context("Failed to flush BMP file")
    }

    /// Read lines until one holds a full row. `None` means the capture was
    /// stopped.
    fn next_row(
        &mut self,
        row: usize,
        summary: &mut CaptureSummary,
    ) -> Result<Option<Vec<u32>>> {
        let mut attempts = 0u32;

        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Ok(None);
            }

            match read_pixel_line(&mut self.reader, self.layout.width)? {
                LineRead::Row(pixels) => {
                    if tracing::enabled!(tracing::Level::TRACE) {
                        let hex: String = pixels
                            .iter()
                            .take(10)
                            .map(|p| format!("{:06x}", p))
                            .collect::<Vec<_>>()
                            .join(" ");
                        trace!("Row {} first pixels: {}", row, hex);
                    }
                    return Ok(Some(pixels));
                }
                LineRead::Incomplete { tokens } => {
                    summary.lines_discarded += 1;
                    attempts += 1;
                    debug!(
                        "Row {}: discarded line with {} tokens (attempt {})",
                        row, tokens, attempts
                    );

                    if self.max_retries > 0 && attempts > self.max_retries {
                        anyhow::bail!(
                            "No complete line for row {} after {} attempts",
                            row, attempts
                        );
                    }
                }
                LineRead::Closed => {
                    anyhow::bail!("Serial stream closed while waiting for row {}", row);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> (R, F) {
        (self.reader, self.file)
    }
}
