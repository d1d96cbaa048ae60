//! Synthetic frames for exercising a transmitter without a camera

use crate::frame::FrameFormat;
use bytes::Bytes;

/// BGR colors of the bars, left to right
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

/// Vertical color bars scrolling one column per frame
pub struct TestPattern {
    format: FrameFormat,
    offset: u32,
}

impl TestPattern {
    pub fn new(format: FrameFormat) -> Self {
        Self { format, offset: 0 }
    }

    /// Render the next frame in the configured format
    pub fn next_frame(&mut self) -> Bytes {
        let FrameFormat { width, height, channels } = self.format;
        let channels = channels as usize;
        let bar_width = (width / BARS.len() as u32).max(1);

        let mut row = Vec::with_capacity(self.format.row_bytes());
        for x in 0..width {
            let bar = (((x + self.offset) % width) / bar_width) as usize % BARS.len();
            let [b, g, r] = BARS[bar];
            match channels {
                1 => row.push(((u16::from(b) + u16::from(g) + u16::from(r)) / 3) as u8),
                _ => {
                    row.extend_from_slice(&[b, g, r]);
                    row.resize(row.len() + channels.saturating_sub(3), 255);
                }
            }
        }

        let mut frame = Vec::with_capacity(self.format.byte_len());
        for _ in 0..height {
            frame.extend_from_slice(&row);
        }

        self.offset = (self.offset + 1) % width.max(1);
        Bytes::from(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_match_format_size() {
        for channels in [1, 3, 4] {
            let format = FrameFormat::new(16, 4, channels);
            let mut pattern = TestPattern::new(format);
            assert_eq!(pattern.next_frame().len(), format.byte_len());
        }
    }

    #[test]
    fn pattern_scrolls() {
        let mut pattern = TestPattern::new(FrameFormat::new(16, 1, 3));
        let first = pattern.next_frame();
        let second = pattern.next_frame();
        assert_ne!(first, second);
        assert_eq!(&first[..3], &[255, 255, 255]);
    }
}
