//! Video receiver: USB camera or RTP/UDP H.264/H.265 into a frame buffer
//!
//! Decoded frames are converted to the configured raw format and copied into a
//! fixed-size [`FrameBuffer`] from the appsink streaming thread.

use super::event_loop::EventLoop;
use super::stage::assemble;
use super::topology::{describe, receiver_topology, FRAME_SINK};
use super::{PipelineError, PipelineState};
use crate::config::ReceiverConfig;
use crate::frame::{FrameBuffer, FrameStats, ReceivedFrame};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PIPELINE_NAME: &str = "video-receiver";

/// Receiving pipeline delivering raw frames into a shared buffer
pub struct VideoReceiver {
    pipeline: gst::Pipeline,
    config: ReceiverConfig,
    frames: Arc<FrameBuffer>,
    event_loop: EventLoop,
}

impl VideoReceiver {
    /// Build the pipeline for `config.source` and set it playing
    pub fn new(config: ReceiverConfig) -> Result<Self, PipelineError> {
        gst::init().map_err(|e| PipelineError::InitFailed(e.to_string()))?;

        let stages = receiver_topology(&config)?;
        info!("Receiver source: {}", config.source);
        debug!("Receiver pipeline: {}", describe(&stages));

        let pipeline = assemble(PIPELINE_NAME, &stages)?;
        let frames = Arc::new(FrameBuffer::new(config.frame_format()));

        let appsink = pipeline
            .by_name(FRAME_SINK)
            .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| PipelineError::ElementFailed(format!("{} is not an appsink", FRAME_SINK)))?;
        install_sample_callback(&appsink, frames.clone());

        let event_loop = EventLoop::new(PIPELINE_NAME, &pipeline)?;

        info!("Now playing");
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| PipelineError::StateChangeFailed(format!("Failed to start receiver: {}", e)))?;

        Ok(Self {
            pipeline,
            config,
            frames,
            event_loop,
        })
    }

    /// Start the event loop on its worker thread; a no-op if already running
    pub fn run(&self) -> Result<(), PipelineError> {
        if self.event_loop.spawn()? {
            info!("Receiver running...");
        }
        Ok(())
    }

    /// Stop the event loop and release the pipeline
    pub fn stop(&self) -> Result<(), PipelineError> {
        info!("Stopping receiver");
        self.event_loop.quit();
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| PipelineError::StateChangeFailed(format!("Failed to stop receiver: {}", e)))?;
        Ok(())
    }

    /// Block until the event loop ends on its own (end of stream or error)
    pub fn wait(&self) -> Result<(), PipelineError> {
        self.event_loop.wait()
    }

    /// Whether at least one frame has been received
    pub fn frame_available(&self) -> bool {
        self.frames.frame_available()
    }

    /// Owned copy of the most recent frame
    pub fn latest_frame(&self) -> Option<ReceivedFrame> {
        self.frames.snapshot()
    }

    /// Copy the most recent frame into a caller buffer; returns its sequence
    pub fn copy_latest(&self, dst: &mut [u8]) -> Option<u64> {
        self.frames.copy_latest(dst)
    }

    /// Wait up to `timeout` for a frame newer than the last one seen
    pub fn wait_frame(&self, after: u64, timeout: Duration) -> Option<ReceivedFrame> {
        self.frames.wait_newer(after, timeout)
    }

    /// Shared frame buffer
    pub fn frames(&self) -> &Arc<FrameBuffer> {
        &self.frames
    }

    pub fn stats(&self) -> FrameStats {
        self.frames.stats()
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

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }
}

impl Drop for VideoReceiver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn install_sample_callback(appsink: &gst_app::AppSink, frames: Arc<FrameBuffer>) {
    let warned = AtomicBool::new(false);
    appsink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let pts = buffer.pts().map(|t| t.nseconds());

                let info = sample
                    .caps()
                    .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok());

                let copied = match info {
                    Some(info) => {
                        let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
                            .map_err(|_| gst::FlowError::Error)?;
                        let stride = frame.plane_stride()[0].max(0) as usize;
                        let data = frame.plane_data(0).map_err(|_| gst::FlowError::Error)?;
                        frames.write_strided(data, stride, pts)
                    }
                    None => {
                        let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                        frames.write(map.as_slice(), pts)
                    }
                };

                if copied != frames.len() && !warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        "Received frame filled {} of {} buffer bytes",
                        copied,
                        frames.len()
                    );
                }

                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SinkKind, SourceKind, TransmitterConfig};
    use crate::gstreamer::probe::missing_factories;
    use crate::gstreamer::topology::transmitter_topology;
    use crate::gstreamer::transmitter::VideoTransmitter;
    use crate::pattern::TestPattern;
    use std::time::Instant;

    fn runtime_supports(config: &ReceiverConfig) -> bool {
        if gst::init().is_err() {
            return false;
        }
        match receiver_topology(config) {
            Ok(stages) => missing_factories(&stages).is_empty(),
            Err(_) => false,
        }
    }

    #[test]
    fn network_sources_construct_playing_pipelines() {
        for source in [SourceKind::H264, SourceKind::H265] {
            let config = ReceiverConfig {
                source,
                port: 0,
                width: 64,
                height: 48,
                ..ReceiverConfig::default()
            };
            if !runtime_supports(&config) {
                continue;
            }

            let receiver = VideoReceiver::new(config).unwrap();
            assert_eq!(receiver.frames().len(), 64 * 48 * 3);
            assert!(!receiver.frame_available());

            receiver.run().unwrap();
            receiver.run().unwrap();
            assert!(receiver.failure().is_none());

            receiver.stop().unwrap();
            assert_eq!(receiver.state(), PipelineState::Stopped);
        }
    }

    #[test]
    fn invalid_channels_fail_construction() {
        if gst::init().is_err() {
            return;
        }
        let config = ReceiverConfig {
            channels: 2,
            ..ReceiverConfig::default()
        };
        assert!(matches!(
            VideoReceiver::new(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_frames_fail_before_allocation() {
        if gst::init().is_err() {
            return;
        }
        let config = ReceiverConfig {
            source: SourceKind::H264,
            width: 100_000,
            height: 100_000,
            channels: 4,
            ..ReceiverConfig::default()
        };
        assert!(matches!(
            VideoReceiver::new(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .and_then(|socket| socket.local_addr())
            .map(|addr| addr.port())
            .unwrap()
    }

    /// BGR at width 66 gives 198-byte rows, which GStreamer pads to 200
    #[test]
    fn h264_loopback_delivers_packed_frames() {
        if gst::init().is_err() {
            return;
        }
        let (width, height) = (66, 48);
        let port = free_udp_port();

        let rx_config = ReceiverConfig {
            source: SourceKind::H264,
            port,
            width,
            height,
            channels: 3,
            ..ReceiverConfig::default()
        };
        let tx_config = TransmitterConfig {
            destination: SinkKind::H264,
            host: "127.0.0.1".into(),
            port,
            width,
            height,
            framerate: 30,
            ..TransmitterConfig::default()
        };
        let tx_stages = match transmitter_topology(&tx_config) {
            Ok(stages) => stages,
            Err(_) => return,
        };
        if !runtime_supports(&rx_config) || !missing_factories(&tx_stages).is_empty() {
            return;
        }

        let receiver = VideoReceiver::new(rx_config).unwrap();
        receiver.run().unwrap();

        let transmitter = VideoTransmitter::new(tx_config).unwrap();
        let mut pattern = TestPattern::new(transmitter.config().frame_format());
        transmitter.publish_frame(pattern.next_frame()).unwrap();
        transmitter.run().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut received = None;
        while received.is_none() && Instant::now() < deadline {
            transmitter.publish_frame(pattern.next_frame()).unwrap();
            received = receiver.wait_frame(0, Duration::from_millis(100));
        }

        let frame = received.expect("no frame arrived over loopback");
        let packed = width as usize * height as usize * 3;
        assert_eq!(frame.data.len(), packed);
        assert!(frame.sequence >= 1);
        assert!(receiver.frame_available());
        assert!(receiver.stats().total_frames > 0);
        assert_eq!(receiver.stats().total_bytes % packed as u64, 0);
        assert!(receiver.failure().is_none());

        transmitter.stop().unwrap();
        receiver.stop().unwrap();
    }
}
