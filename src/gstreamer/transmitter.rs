//! Video transmitter: published frames out over RTP/UDP or to a display
//!
//! The appsrc asks for data with `need-data` and backs off with
//! `enough-data`. While data is wanted, an idle source on the transmitter's
//! own main context keeps pushing the latest published frame.

use super::event_loop::EventLoop;
use super::stage::assemble;
use super::topology::{describe, frame_duration, transmitter_topology, FRAME_SOURCE};
use super::{PipelineError, PipelineState};
use crate::config::TransmitterConfig;
use crate::frame::{FrameCounters, FrameSlot, FrameStats};
use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const PIPELINE_NAME: &str = "video-transmitter";

/// Guard around the idle source feeding the appsrc.
///
/// Starting while a source is installed and stopping while none is installed
/// are both no-ops.
#[derive(Default)]
pub struct FeedGate {
    source: Mutex<Option<glib::Source>>,
}

impl FeedGate {
    /// Install the source built by `make` unless one is already installed.
    /// Returns whether a new source was installed.
    pub fn start(&self, make: impl FnOnce() -> glib::Source) -> bool {
        let mut source = self.source.lock();
        if source.is_some() {
            return false;
        }
        *source = Some(make());
        true
    }

    /// Destroy the installed source. Returns whether one was installed.
    pub fn stop(&self) -> bool {
        match self.source.lock().take() {
            Some(source) => {
                source.destroy();
                true
            }
            None => false,
        }
    }

    /// Forget the installed source without destroying it; used by the source
    /// itself when it ends by returning `Break`.
    pub fn release(&self) {
        self.source.lock().take();
    }

    pub fn is_active(&self) -> bool {
        self.source.lock().is_some()
    }
}

/// State shared between the transmitter and its appsrc callbacks
struct Feeder {
    appsrc: gst_app::AppSrc,
    context: glib::MainContext,
    slot: Arc<FrameSlot>,
    gate: FeedGate,
    next_pts: AtomicU64,
    duration: gst::ClockTime,
    counters: FrameCounters,
}

impl Feeder {
    fn start(self: &Arc<Self>) {
        let feeder = self.clone();
        let started = self.gate.start(|| {
            let source = glib::source::idle_source_new(
                Some("videolink-feed"),
                glib::Priority::DEFAULT_IDLE,
                move || feeder.feed(),
            );
            source.attach(Some(&self.context));
            source
        });
        if started {
            debug!("Start feeding");
        }
    }

    fn stop(&self) {
        if self.gate.stop() {
            debug!("Stop feeding");
        }
    }

    /// Push one copy of the latest frame
    fn feed(&self) -> glib::ControlFlow {
        let frame = self.slot.latest();
        let len = frame.len();
        let pts = gst::ClockTime::from_nseconds(
            self.next_pts.fetch_add(self.duration.nseconds(), Ordering::Relaxed),
        );

        let mut buffer = gst::Buffer::from_slice(frame);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(pts);
            buffer.set_duration(self.duration);
        }

        match self.appsrc.push_buffer(buffer) {
            Ok(_) => {
                self.counters.record(len);
                glib::ControlFlow::Continue
            }
            Err(err) => {
                warn!("Stopped feeding, appsrc push failed: {:?}", err);
                self.gate.release();
                glib::ControlFlow::Break
            }
        }
    }
}

/// Transmitting pipeline fed from a latest-frame slot
pub struct VideoTransmitter {
    pipeline: gst::Pipeline,
    config: TransmitterConfig,
    slot: Arc<FrameSlot>,
    feeder: Arc<Feeder>,
    event_loop: EventLoop,
}

impl VideoTransmitter {
    /// Build the pipeline for `config.destination` and set it playing
    pub fn new(config: TransmitterConfig) -> Result<Self, PipelineError> {
        gst::init().map_err(|e| PipelineError::InitFailed(e.to_string()))?;

        let stages = transmitter_topology(&config)?;
        info!("Transmitter destination: {}", config.destination);
        debug!("Transmitter pipeline: {}", describe(&stages));

        let pipeline = assemble(PIPELINE_NAME, &stages)?;
        let appsrc = pipeline
            .by_name(FRAME_SOURCE)
            .and_then(|e| e.downcast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| PipelineError::ElementFailed(format!("{} is not an appsrc", FRAME_SOURCE)))?;

        let event_loop = EventLoop::new(PIPELINE_NAME, &pipeline)?;
        let slot = Arc::new(FrameSlot::new(config.frame_format()));
        let duration = gst::ClockTime::from_nseconds(frame_duration(config.framerate).as_nanos() as u64);

        let feeder = Arc::new(Feeder {
            appsrc: appsrc.clone(),
            context: event_loop.context().clone(),
            slot: slot.clone(),
            gate: FeedGate::default(),
            next_pts: AtomicU64::new(0),
            duration,
            counters: FrameCounters::default(),
        });

        let need = Arc::downgrade(&feeder);
        let enough = Arc::downgrade(&feeder);
        appsrc.set_callbacks(
            gst_app::AppSrcCallbacks::builder()
                .need_data(move |_, _| {
                    if let Some(feeder) = need.upgrade() {
                        feeder.start();
                    }
                })
                .enough_data(move |_| {
                    if let Some(feeder) = enough.upgrade() {
                        feeder.stop();
                    }
                })
                .build(),
        );

        info!("Now streaming");
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| PipelineError::StateChangeFailed(format!("Failed to start transmitter: {}", e)))?;

        Ok(Self {
            pipeline,
            config,
            slot,
            feeder,
            event_loop,
        })
    }

    /// Start the event loop on its worker thread; a no-op if already running
    pub fn run(&self) -> Result<(), PipelineError> {
        if self.event_loop.spawn()? {
            info!("Streaming...");
        }
        Ok(())
    }

    /// Stop feeding, stop the event loop and release the pipeline
    pub fn stop(&self) -> Result<(), PipelineError> {
        info!("Stopping transmitter");
        self.feeder.stop();
        self.event_loop.quit();
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| PipelineError::StateChangeFailed(format!("Failed to stop transmitter: {}", e)))?;
        Ok(())
    }

    /// Block until the event loop ends on its own (end of stream or error)
    pub fn wait(&self) -> Result<(), PipelineError> {
        self.event_loop.wait()
    }

    /// Replace the frame pushed on the next `need-data`
    pub fn publish_frame(&self, data: impl Into<Bytes>) -> Result<u64, PipelineError> {
        self.slot.publish(data)
    }

    /// Shared latest-frame slot
    pub fn frame_slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Whether the idle feeder is currently installed
    pub fn is_feeding(&self) -> bool {
        self.feeder.gate.is_active()
    }

    /// Frames and bytes pushed into the pipeline
    pub fn stats(&self) -> FrameStats {
        self.feeder.counters.snapshot()
    }

    /// Get the current state
    pub fn state(&self) -> PipelineState {
        PipelineState::of(&self.pipeline)
    }

    /// Whether the event loop is running
    pub fn is_running(&self) -> bool {
        self.event_loop.is_running()
    }

    /// Error posted on the bus, if any
    pub fn failure(&self) -> Option<PipelineError> {
        self.event_loop.failure()
    }

    pub fn config(&self) -> &TransmitterConfig {
        &self.config
    }
}

impl Drop for VideoTransmitter {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
