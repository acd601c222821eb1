use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::metadata::LevelFilter;

mod bmp;
mod capture;
mod config;
mod line_reader;
mod pixel_format;
mod serial;

use config::Config;

#[derive(Parser)]
#[command(name = "bmp_capture")]
#[command(about = "Serial framebuffer capture\n\nReads hex pixel lines streamed by a display controller and writes them into an existing BMP file.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: Option<PathBuf>,

    /// Serial port of the display controller
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// BMP file to update in place
    #[arg(long)]
    bmp: Option<PathBuf>,

    /// Image width in pixels (values per line)
    #[arg(long)]
    width: Option<usize>,

    /// Image height in pixels (lines per capture)
    #[arg(long)]
    height: Option<usize>,

    /// Incomplete lines tolerated per row before giving up (0 = forever)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Fail when the BMP header disagrees with width/height
    #[arg(long)]
    strict_header: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (pixel dumps every row)
    #[arg(long)]
    ddebug: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let data = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&data)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(bmp) = &self.bmp {
            config.image.path = bmp.clone();
        }
        if let Some(width) = self.width {
            config.image.width = width;
        }
        if let Some(height) = self.height {
            config.image.height = height;
        }
        if let Some(max_retries) = self.max_retries {
            config.capture.max_retries = max_retries;
        }
        if self.strict_header {
            config.capture.strict_header = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let level = if cli.ddebug {
        LevelFilter::TRACE
    } else if cli.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = cli.load_config()?;

    let mut capture = capture::open(&config)?;
    println!("Pixel data offset = {}", capture.pixel_offset());

    // Ctrl-C stops the capture between lines
    let running = capture.get_running_flag();
    let result = ctrlc::set_handler(move || {
        running.store(false, std::sync::atomic::Ordering::Relaxed);
    });

    if let Err(e) = result {
        tracing::warn!("Could not set Ctrl-C handler: {}", e);
    }

    let summary = capture.run()?;

    if summary.cancelled {
        println!(
            "Stopped: {}/{} lines written to {}",
            summary.rows_written,
            config.image.height,
            config.image.path.display()
        );
    } else {
        println!("✓ Done: image updated in {}", config.image.path.display());
    }
    if summary.lines_discarded > 0 {
        println!("{} incomplete lines discarded", summary.lines_discarded);
    }

    Ok(())
}
