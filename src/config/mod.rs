//! Configuration management for videolink

use crate::frame::FrameFormat;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Receiver source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    /// Local USB camera
    #[default]
    Usb,
    /// RTP/UDP H.264 stream
    H264,
    /// RTP/UDP H.265 stream
    H265,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Usb => "usb",
            SourceKind::H264 => "h264",
            SourceKind::H265 => "h265",
        }
    }

    /// Parse a source name, falling back to USB for anything unrecognized
    pub fn from_name_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "usb" => SourceKind::Usb,
            "h264" | "h.264" => SourceKind::H264,
            "h265" | "h.265" | "hevc" => SourceKind::H265,
            other => {
                warn!("Unknown source kind {:?}, using {}", other, SourceKind::default());
                SourceKind::default()
            }
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SourceKind {
    fn from(name: String) -> Self {
        Self::from_name_lossy(&name)
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Transmitter destination selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum SinkKind {
    /// RTP/UDP H.264 stream
    #[default]
    H264,
    /// RTP/UDP H.265 stream
    H265,
    /// Local display window
    Display,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::H264 => "h264",
            SinkKind::H265 => "h265",
            SinkKind::Display => "display",
        }
    }

    /// Parse a destination name, falling back to H.264 for anything unrecognized
    pub fn from_name_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" => SinkKind::H264,
            "h265" | "h.265" | "hevc" => SinkKind::H265,
            "display" | "disp" => SinkKind::Display,
            other => {
                warn!("Unknown destination kind {:?}, using {}", other, SinkKind::default());
                SinkKind::default()
            }
        }
    }

    /// Whether frames leave the host over RTP/UDP
    pub fn is_network(&self) -> bool {
        !matches!(self, SinkKind::Display)
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for SinkKind {
    fn from(name: String) -> Self {
        Self::from_name_lossy(&name)
    }
}

impl From<SinkKind> for String {
    fn from(kind: SinkKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Receiver construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Output frame width in pixels
    pub width: u32,

    /// Output frame height in pixels
    pub height: u32,

    /// Bytes per pixel of the delivered frames (1, 3 or 4)
    pub channels: u32,

    /// UDP port for network sources
    pub port: u16,

    /// Source topology
    pub source: SourceKind,

    /// Multicast interface for network sources
    pub interface: Option<String>,

    /// Bind or multicast group address for network sources
    pub address: Option<String>,

    /// Camera device for USB sources
    pub device: Option<String>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            channels: 3,
            port: 5000,
            source: SourceKind::default(),
            interface: None,
            address: None,
            device: None,
        }
    }
}

impl ReceiverConfig {
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.width, self.height, self.channels)
    }
}

/// Transmitter construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// Input frame width in pixels
    pub width: u32,

    /// Input frame height in pixels
    pub height: u32,

    /// Bytes per pixel of published frames (1, 3 or 4)
    pub channels: u32,

    /// Frames per second advertised to the encoder
    pub framerate: u32,

    /// Destination UDP port
    pub port: u16,

    /// Destination topology
    pub destination: SinkKind,

    /// Destination host for network topologies
    pub host: String,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            channels: 3,
            framerate: 30,
            port: 5000,
            destination: SinkKind::default(),
            host: "127.0.0.1".to_string(),
        }
    }
}

impl TransmitterConfig {
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::new(self.width, self.height, self.channels)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Receiver configuration
    #[serde(default)]
    pub receiver: ReceiverConfig,

    /// Transmitter configuration
    #[serde(default)]
    pub transmitter: TransmitterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let rx = &self.receiver;
        if rx.width == 0 || rx.height == 0 {
            return Err("Receiver dimensions must be non-zero".into());
        }
        rx.frame_format().validate()?;

        let tx = &self.transmitter;
        if tx.width == 0 || tx.height == 0 {
            return Err("Transmitter dimensions must be non-zero".into());
        }
        tx.frame_format().validate()?;

        if tx.framerate == 0 {
            return Err("Transmitter framerate must be non-zero".into());
        }

        if tx.destination.is_network() && tx.host.trim().is_empty() {
            return Err("Transmitter host must be set for network destinations".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_invalid_dimensions() {
        let mut cfg = Config::default();
        cfg.receiver.width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_unsupported_channels() {
        let mut cfg = Config::default();
        cfg.transmitter.channels = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_frames() {
        let mut cfg = Config::default();
        cfg.receiver.width = 100_000;
        cfg.receiver.height = 100_000;
        cfg.receiver.channels = 4;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.transmitter.width = u32::MAX;
        cfg.transmitter.height = u32::MAX;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_host_for_network_destinations() {
        let mut cfg = Config::default();
        cfg.transmitter.host = String::new();
        assert!(cfg.validate().is_err());

        cfg.transmitter.destination = SinkKind::Display;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/videolink.toml")).unwrap();
        assert_eq!(cfg.receiver, ReceiverConfig::default());
        assert_eq!(cfg.transmitter.framerate, 30);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [receiver]
            source = "H265"
            port = 6000
            address = "239.1.1.1"

            [transmitter]
            destination = "disp"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.receiver.source, SourceKind::H265);
        assert_eq!(cfg.receiver.port, 6000);
        assert_eq!(cfg.receiver.width, 640);
        assert_eq!(cfg.receiver.address.as_deref(), Some("239.1.1.1"));
        assert_eq!(cfg.transmitter.destination, SinkKind::Display);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn unknown_kinds_fall_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [receiver]
            source = "firewire"

            [transmitter]
            destination = "vp8"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.receiver.source, SourceKind::Usb);
        assert_eq!(cfg.transmitter.destination, SinkKind::H264);
    }

    #[test]
    fn kinds_serialize_as_names() {
        let text = toml::to_string(&Config::default()).unwrap();
        assert!(text.contains("source = \"usb\""));
        assert!(text.contains("destination = \"h264\""));
    }
}
