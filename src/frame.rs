//! Frame hand-off between the application and the pipeline threads
//!
//! [`FrameBuffer`] holds the most recent decoded frame on the receive side,
//! [`FrameSlot`] holds the most recent published frame on the transmit side.
//! Both are last-write-wins under a mutex.

use crate::gstreamer::PipelineError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Largest frame a receiver or transmitter will allocate (256 MiB)
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Dimensions and pixel size of raw frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameFormat {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self { width, height, channels }
    }

    /// Size of one tightly packed frame
    pub fn byte_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Size of one tightly packed row
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Frame size, or `None` if it does not fit in `usize`
    pub fn checked_byte_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.channels as usize)?
            .checked_mul(self.height as usize)
    }

    /// Check the channel count and that the frame size is non-zero and at
    /// most [`MAX_FRAME_BYTES`]. Returns the frame size.
    pub fn validate(&self) -> Result<usize, PipelineError> {
        self.raw_format()?;
        match self.checked_byte_len() {
            Some(0) => Err(PipelineError::InvalidConfig(format!(
                "frame {} has zero size",
                self
            ))),
            Some(len) if len <= MAX_FRAME_BYTES => Ok(len),
            _ => Err(PipelineError::InvalidConfig(format!(
                "frame {} exceeds {} bytes",
                self, MAX_FRAME_BYTES
            ))),
        }
    }

    /// GStreamer raw video format carrying this many channels
    pub fn raw_format(&self) -> Result<&'static str, PipelineError> {
        match self.channels {
            1 => Ok("GRAY8"),
            3 => Ok("BGR"),
            4 => Ok("BGRx"),
            n => Err(PipelineError::InvalidConfig(format!(
                "unsupported channel count {} (expected 1, 3 or 4)",
                n
            ))),
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Owned copy of a received frame
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    /// Frame sequence number, starting at 1
    pub sequence: u64,
    /// Presentation timestamp in nanoseconds
    pub pts: Option<u64>,
    /// Tightly packed pixel data
    pub data: Vec<u8>,
}

/// Frame statistics for monitoring
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Total frames moved
    pub total_frames: u64,

    /// Total bytes moved
    pub total_bytes: u64,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} frames, {} bytes", self.total_frames, self.total_bytes)
    }
}

/// Lock-free frame and byte counters
#[derive(Debug, Default)]
pub struct FrameCounters {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl FrameCounters {
    /// Record one frame; returns the new frame count
    pub fn record(&self, bytes: usize) -> u64 {
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> FrameStats {
        FrameStats {
            total_frames: self.frames.load(Ordering::Relaxed),
            total_bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

struct BufferState {
    data: Vec<u8>,
    sequence: u64,
    pts: Option<u64>,
}

/// Fixed-size buffer receiving decoded frames
pub struct FrameBuffer {
    format: FrameFormat,
    state: Mutex<BufferState>,
    written: Condvar,
    counters: FrameCounters,
}

impl FrameBuffer {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            state: Mutex::new(BufferState {
                data: vec![0; format.byte_len()],
                sequence: 0,
                pts: None,
            }),
            written: Condvar::new(),
            counters: FrameCounters::default(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Buffer size, always `width * height * channels`
    pub fn len(&self) -> usize {
        self.format.byte_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy a packed frame in, truncating anything past the buffer end.
    /// Returns the number of bytes copied.
    pub fn write(&self, src: &[u8], pts: Option<u64>) -> usize {
        let copied = {
            let mut state = self.state.lock();
            let n = src.len().min(state.data.len());
            state.data[..n].copy_from_slice(&src[..n]);
            state.sequence += 1;
            state.pts = pts;
            n
        };
        self.finish_write(copied)
    }

    /// Copy a frame whose rows are `stride` bytes apart, dropping row padding.
    /// Rows and row widths beyond the buffer's format are clipped.
    pub fn write_strided(&self, src: &[u8], stride: usize, pts: Option<u64>) -> usize {
        let copied = {
            let mut state = self.state.lock();
            let n = copy_rows(
                src,
                stride,
                &mut state.data,
                self.format.row_bytes(),
                self.format.height as usize,
            );
            state.sequence += 1;
            state.pts = pts;
            n
        };
        self.finish_write(copied)
    }

    fn finish_write(&self, copied: usize) -> usize {
        self.counters.record(copied);
        self.written.notify_all();
        copied
    }

    /// Whether at least one frame has been written
    pub fn frame_available(&self) -> bool {
        self.sequence() > 0
    }

    /// Sequence number of the current frame, 0 before the first write
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    /// Copy the current frame into `dst`; returns its sequence number,
    /// or `None` if nothing has been written yet.
    pub fn copy_latest(&self, dst: &mut [u8]) -> Option<u64> {
        let state = self.state.lock();
        if state.sequence == 0 {
            return None;
        }
        let n = dst.len().min(state.data.len());
        dst[..n].copy_from_slice(&state.data[..n]);
        Some(state.sequence)
    }

    /// Owned copy of the current frame
    pub fn snapshot(&self) -> Option<ReceivedFrame> {
        let state = self.state.lock();
        Self::snapshot_locked(&state)
    }

    fn snapshot_locked(state: &BufferState) -> Option<ReceivedFrame> {
        if state.sequence == 0 {
            return None;
        }
        Some(ReceivedFrame {
            sequence: state.sequence,
            pts: state.pts,
            data: state.data.clone(),
        })
    }

    /// Block until a frame newer than `after` arrives or `timeout` passes
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<ReceivedFrame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.sequence <= after {
            if self.written.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if state.sequence > after {
            Self::snapshot_locked(&state)
        } else {
            None
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.counters.snapshot()
    }
}

/// Copy `rows` rows of `row_bytes` from a source laid out with `stride` bytes
/// per row into a packed destination. Returns the number of bytes copied.
pub fn copy_rows(src: &[u8], stride: usize, dst: &mut [u8], row_bytes: usize, rows: usize) -> usize {
    if row_bytes == 0 {
        return 0;
    }
    let stride = stride.max(1);
    let mut copied = 0;
    for (row, out) in dst.chunks_mut(row_bytes).take(rows).enumerate() {
        let start = row * stride;
        if start >= src.len() {
            break;
        }
        let n = out.len().min(stride).min(src.len() - start);
        out[..n].copy_from_slice(&src[start..start + n]);
        copied += n;
    }
    copied
}

/// Latest frame published for transmission
pub struct FrameSlot {
    format: FrameFormat,
    frame: Mutex<Bytes>,
    sequence: AtomicU64,
}

impl FrameSlot {
    /// New slot holding an all-zero frame
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            frame: Mutex::new(Bytes::from(vec![0u8; format.byte_len()])),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Replace the latest frame; returns the new publish count
    pub fn publish(&self, data: impl Into<Bytes>) -> Result<u64, PipelineError> {
        let data = data.into();
        let expected = self.format.byte_len();
        if data.len() != expected {
            return Err(PipelineError::FrameSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        *self.frame.lock() = data;
        Ok(self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Cheap clone of the latest frame
    pub fn latest(&self) -> Bytes {
        self.frame.lock().clone()
    }

    /// Number of frames published so far
    pub fn published(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
