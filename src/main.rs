//! videolink - Main entry point
//!
//! Receive or transmit video through GStreamer from the command line.

mod args;

use args::{Args, Command};
use clap::Parser;
use log::{error, info, warn};
use std::time::Duration;
use tokio::signal;
use videolink::config::Config;
use videolink::gstreamer::{self, probe, topology};
use videolink::pattern::TestPattern;
use videolink::{VideoReceiver, VideoTransmitter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config {:?}: {}, using defaults", args.config, e);
            Config::default()
        }
    };

    let log_level = if args.verbose { "debug" } else { config.logging.level.as_str() };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("VIDEOLINK_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    info!("videolink v{}", env!("CARGO_PKG_VERSION"));

    args.apply_overrides(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(e);
    }

    if let Err(e) = gstreamer::init() {
        error!("Failed to initialize GStreamer: {}", e);
        return Err(e.into());
    }

    match args.command {
        Command::Receive { .. } => receive(&config).await,
        Command::Transmit { .. } => transmit(&config).await,
        Command::Probe => {
            print_probe();
            Ok(())
        }
    }
}

async fn receive(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let receiver = VideoReceiver::new(config.receiver.clone())?;
    receiver.run()?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_frames = 0;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if !receiver.is_running() {
                    warn!("Receiver event loop ended");
                    break;
                }
                let stats = receiver.stats();
                info!(
                    "Received {} fps ({} total)",
                    stats.total_frames - last_frames,
                    stats
                );
                last_frames = stats.total_frames;
            }
        }
    }

    receiver.stop()?;
    match receiver.failure() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn transmit(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let tx = &config.transmitter;
    let transmitter = VideoTransmitter::new(tx.clone())?;
    let mut pattern = TestPattern::new(tx.frame_format());
    transmitter.publish_frame(pattern.next_frame())?;
    transmitter.run()?;

    let mut frame_ticker = tokio::time::interval(topology::frame_duration(tx.framerate));
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_frames = 0;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = frame_ticker.tick() => {
                transmitter.publish_frame(pattern.next_frame())?;
            }
            _ = stats_ticker.tick() => {
                if !transmitter.is_running() {
                    warn!("Transmitter event loop ended");
                    break;
                }
                let stats = transmitter.stats();
                info!(
                    "Pushed {} fps ({} total)",
                    stats.total_frames - last_frames,
                    stats
                );
                last_frames = stats.total_frames;
            }
        }
    }

    transmitter.stop()?;
    match transmitter.failure() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn print_probe() {
    for report in probe::report() {
        let status = if report.is_usable() {
            "ok".to_string()
        } else {
            format!("missing {}", report.missing.join(", "))
        };
        println!("{:<8} {:<7} {}", report.direction, report.kind, status);
        println!("    {}", topology::describe(&report.stages));
    }
}
