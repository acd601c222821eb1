use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub image: ImageConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout for a single serial read, in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "COM7".to_string(),
            baud_rate: 115200,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Existing BMP file, updated in place
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            path: PathBuf::from("capture.bmp"),
            width: 480,
            height: 272,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Consecutive incomplete lines tolerated for one row (0 = retry forever)
    pub max_retries: u32,
    /// Fail instead of warn when the BMP header disagrees with width/height
    pub strict_header: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            max_retries: 100,
            strict_header: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.image.width == 0 || self.image.height == 0 {
            anyhow::bail!(
                "Image geometry must be non-zero (got {}x{})",
                self.image.width,
                self.image.height
            );
        }
        if self.serial.baud_rate == 0 {
            anyhow::bail!("Baud rate must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device() {
        let config = Config::default();
        assert_eq!(config.serial.port, "COM7");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.image.width, 480);
        assert_eq!(config.image.height, 272);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{ "serial": { "port": "/dev/ttyACM0" }, "image": { "path": "out.bmp" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.image.path, PathBuf::from("out.bmp"));
        assert_eq!(config.image.width, 480);
        assert_eq!(config.capture.max_retries, 100);
    }

    #[test]
    fn test_validate_rejects_empty_geometry() {
        let mut config = Config::default();
        config.image.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
