//! videolink - GStreamer video receive and transmit
//!
//! Receives raw frames from a USB camera or an RTP/UDP H.264/H.265 stream, and
//! transmits published frames as RTP/UDP H.264/H.265 or to a local display.

pub mod config;
pub mod frame;
pub mod gstreamer;
pub mod pattern;

// Re-exports
pub use config::{Config, ReceiverConfig, SinkKind, SourceKind, TransmitterConfig};
pub use frame::{FrameBuffer, FrameFormat, FrameSlot, FrameStats, ReceivedFrame};
pub use gstreamer::{PipelineError, PipelineState, VideoReceiver, VideoTransmitter};
