use anyhow::{Context, Result};
use serialport::SerialPort;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SerialConfig;

/// Open the display controller's serial port (8N1, no flow control)
pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let mut port = serialport::new(&config.port, config.baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(config.timeout_ms))
        .open()
        .with_context(|| format!("Failed to open serial port {}", config.port))?;

    // Some USB CDC bridges hold back data until DTR is asserted
    if let Err(e) = port.write_data_terminal_ready(true) {
        warn!("Failed to set DTR on {}: {}", config.port, e);
    }

    // Allow device to initialize
    thread::sleep(Duration::from_millis(100));

    debug!(
        "Opened {} at {} baud ({} ms read timeout)",
        config.port, config.baud_rate, config.timeout_ms
    );

    Ok(port)
}
