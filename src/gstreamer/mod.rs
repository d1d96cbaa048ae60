//! GStreamer integration for video receive and transmit
//!
//! Pipelines are described as data in [`topology`], instantiated by
//! [`stage`], and driven by a per-pipeline GLib loop from [`event_loop`].

pub mod event_loop;
pub mod probe;
pub mod receiver;
pub mod stage;
pub mod topology;
pub mod transmitter;

pub use receiver::VideoReceiver;
pub use transmitter::VideoTransmitter;

use gstreamer as gst;
use std::error::Error;
use std::fmt;

/// Pipeline construction and runtime errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// GStreamer initialization failed
    InitFailed(String),
    /// One or more element factories are not installed
    ElementMissing(Vec<String>),
    /// Element factory exists but instantiation failed
    ElementFailed(String),
    /// Element does not expose a property the stage needs
    PropertyFailed(String),
    /// Element linking failed
    LinkFailed(String),
    /// State change failed
    StateChangeFailed(String),
    /// Construction parameters are unusable
    InvalidConfig(String),
    /// Published frame does not match the negotiated frame size
    FrameSizeMismatch { expected: usize, actual: usize },
    /// Error message posted on the pipeline bus
    Bus(String),
    /// Event loop thread could not be started or joined
    LoopFailed(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InitFailed(msg) => write!(f, "GStreamer init failed: {}", msg),
            PipelineError::ElementMissing(names) => {
                write!(f, "Missing GStreamer elements: {}", names.join(", "))
            }
            PipelineError::ElementFailed(msg) => write!(f, "Element creation failed: {}", msg),
            PipelineError::PropertyFailed(msg) => write!(f, "Property setup failed: {}", msg),
            PipelineError::LinkFailed(msg) => write!(f, "Element linking failed: {}", msg),
            PipelineError::StateChangeFailed(msg) => write!(f, "State change failed: {}", msg),
            PipelineError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            PipelineError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "Frame size mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            PipelineError::Bus(msg) => write!(f, "Pipeline error: {}", msg),
            PipelineError::LoopFailed(msg) => write!(f, "Event loop failed: {}", msg),
        }
    }
}

impl Error for PipelineError {}

/// Initialize GStreamer subsystem
pub fn init() -> Result<(), PipelineError> {
    gst::init().map_err(|e| PipelineError::InitFailed(e.to_string()))
}

/// Check if GStreamer is available and properly initialized
pub fn is_available() -> bool {
    gst::init().is_ok()
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Pipeline is stopped
    Stopped,
    /// Pipeline is starting
    Starting,
    /// Pipeline is running
    Running,
    /// Pipeline is paused
    Paused,
    /// Pipeline encountered an error
    Error,
}

impl PipelineState {
    /// Read the current (non-blocking) state of a pipeline
    pub fn of(pipeline: &gst::Pipeline) -> Self {
        use gstreamer::prelude::*;

        let (result, current, _) = pipeline.state(gst::ClockTime::ZERO);
        if result.is_err() {
            return PipelineState::Error;
        }
        match current {
            gst::State::Null => PipelineState::Stopped,
            gst::State::Ready => PipelineState::Starting,
            gst::State::Paused => PipelineState::Paused,
            gst::State::Playing => PipelineState::Running,
            _ => PipelineState::Error,
        }
    }
}
