use clap::{Parser, Subcommand};
use std::path::PathBuf;

use videolink::config::{self, SinkKind, SourceKind};

#[derive(Parser, Debug)]
#[command(name = "videolink")]
#[command(version)]
#[command(about = "Receive or transmit video through GStreamer", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "videolink.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive frames and log statistics
    Receive {
        /// Source kind: usb, h264 or h265
        #[arg(short, long)]
        source: Option<String>,

        /// UDP port for network sources
        #[arg(short, long)]
        port: Option<u16>,

        /// Frame width
        #[arg(long)]
        width: Option<u32>,

        /// Frame height
        #[arg(long)]
        height: Option<u32>,

        /// Bytes per pixel (1, 3 or 4)
        #[arg(long)]
        channels: Option<u32>,

        /// Multicast interface
        #[arg(long)]
        interface: Option<String>,

        /// Bind or multicast group address
        #[arg(long)]
        address: Option<String>,

        /// Camera device for USB sources
        #[arg(long)]
        device: Option<String>,
    },

    /// Transmit a moving test pattern
    Transmit {
        /// Destination kind: h264, h265 or display
        #[arg(short, long)]
        destination: Option<String>,

        /// Destination host
        #[arg(long)]
        host: Option<String>,

        /// Destination UDP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Frame width
        #[arg(long)]
        width: Option<u32>,

        /// Frame height
        #[arg(long)]
        height: Option<u32>,

        /// Frames per second
        #[arg(long)]
        framerate: Option<u32>,
    },

    /// List every topology and the elements it is missing
    Probe,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }

    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut config::Config) {
        match &self.command {
            Command::Receive {
                source,
                port,
                width,
                height,
                channels,
                interface,
                address,
                device,
            } => {
                let rx = &mut config.receiver;
                if let Some(source) = source {
                    rx.source = SourceKind::from_name_lossy(source);
                }
                if let Some(port) = port {
                    rx.port = *port;
                }
                if let Some(width) = width {
                    rx.width = *width;
                }
                if let Some(height) = height {
                    rx.height = *height;
                }
                if let Some(channels) = channels {
                    rx.channels = *channels;
                }
                if interface.is_some() {
                    rx.interface = interface.clone();
                }
                if address.is_some() {
                    rx.address = address.clone();
                }
                if device.is_some() {
                    rx.device = device.clone();
                }
            }
            Command::Transmit {
                destination,
                host,
                port,
                width,
                height,
                framerate,
            } => {
                let tx = &mut config.transmitter;
                if let Some(destination) = destination {
                    tx.destination = SinkKind::from_name_lossy(destination);
                }
                if let Some(host) = host {
                    tx.host = host.clone();
                }
                if let Some(port) = port {
                    tx.port = *port;
                }
                if let Some(width) = width {
                    tx.width = *width;
                }
                if let Some(height) = height {
                    tx.height = *height;
                }
                if let Some(framerate) = framerate {
                    tx.framerate = *framerate;
                }
            }
            Command::Probe => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_overrides_apply() {
        let args = Args::parse_from([
            "videolink", "receive", "--source", "h265", "--port", "7000", "--channels", "4",
        ]);
        let mut cfg = config::Config::default();
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.receiver.source, SourceKind::H265);
        assert_eq!(cfg.receiver.port, 7000);
        assert_eq!(cfg.receiver.channels, 4);
        assert_eq!(cfg.transmitter, config::TransmitterConfig::default());
    }

    #[test]
    fn unknown_destination_falls_back() {
        let args = Args::parse_from(["videolink", "transmit", "--destination", "rtsp"]);
        let mut cfg = config::Config::default();
        cfg.transmitter.destination = SinkKind::Display;
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.transmitter.destination, SinkKind::H264);
    }
}
