//! Sequential, seekable frame sources
//!
//! The passes consume frames through [`FrameSource`] so that a decoded video
//! file ([`crate::VideoStream`]) and frames already held in memory
//! ([`MemoryFrameSource`]) drive exactly the same logic.

use opencv::{core::Mat, prelude::*};
use tracing::{debug, instrument};
use crate::common::{AdSplitError, FrameTimecode, Result};

/// A decoded frame with its position in the stream
pub struct Frame {
    pub image: Mat,
    /// Presentation time in milliseconds
    pub timestamp_ms: i64,
    /// Number of frames read up to and including this one
    pub index: u64,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("timestamp_ms", &self.timestamp_ms)
            .field("index", &self.index)
            .field("cols", &self.image.cols())
            .field("rows", &self.image.rows())
            .finish()
    }
}

pub trait FrameSource {
    /// Next frame, or `None` once the stream is exhausted or disconnected
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Position the source so the next frame read is the one nearest `timestamp_ms`
    fn seek_ms(&mut self, timestamp_ms: i64) -> Result<()>;

    fn fps(&self) -> f64;

    fn width(&self) -> i32;

    fn height(&self) -> i32;

    /// Share of the source consumed so far (0.0 to 100.0), when the length is known
    fn progress_percent(&self) -> Option<f64> {
        None
    }

    /// Return to the first frame
    fn rewind(&mut self) -> Result<()> {
        self.seek_ms(0)
    }
}

/// Frames held in memory, timestamped from their position and the framerate
pub struct MemoryFrameSource {
    frames: Vec<Mat>,
    fps: f64,
    width: i32,
    height: i32,
    position: usize,
}

impl MemoryFrameSource {
    /// # Errors
    /// * `EmptyVideo` - If `frames` is empty
    /// * `InvalidConfig` - If fps is not positive or frame sizes differ
    pub fn new(frames: Vec<Mat>, fps: f64) -> Result<Self> {
        if !(fps > 0.0) {
            return Err(AdSplitError::config_error(format!("fps must be positive, got {}", fps)));
        }
        let first = frames.first().ok_or(AdSplitError::EmptyVideo)?;
        let (width, height) = (first.cols(), first.rows());

        if let Some(pos) = frames.iter().position(|f| f.cols() != width || f.rows() != height) {
            return Err(AdSplitError::config_error(format!(
                "frame {} is {}x{}, expected {}x{}",
                pos, frames[pos].cols(), frames[pos].rows(), width, height
            )));
        }

        debug!("Created in-memory source: {} frames of {}x{} at {}fps",
               frames.len(), width, height, fps);

        Ok(Self { frames, fps, width, height, position: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn timestamp_at(&self, position: usize) -> i64 {
        FrameTimecode::new(position as u64, self.fps).milliseconds()
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.get(self.position) else {
            return Ok(None);
        };
        let frame = Frame {
            image: image.try_clone()?,
            timestamp_ms: self.timestamp_at(self.position),
            index: self.position as u64 + 1,
        };
        self.position += 1;
        Ok(Some(frame))
    }

    /// Lands on the first frame at or after `timestamp_ms`
    #[instrument(skip(self))]
    fn seek_ms(&mut self, timestamp_ms: i64) -> Result<()> {
        self.position = (0..self.frames.len())
            .find(|&p| self.timestamp_at(p) >= timestamp_ms)
            .unwrap_or(self.frames.len());
        debug!("Seeked to frame {}", self.position);
        Ok(())
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn progress_percent(&self) -> Option<f64> {
        Some(self.position as f64 / self.frames.len() as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::*;

    fn source(count: usize) -> MemoryFrameSource {
        let frames = (0..count).map(|i| solid_frame(16, 12, i as u8)).collect();
        MemoryFrameSource::new(frames, 4.0).unwrap()
    }

    #[test]
    fn test_reads_all_frames_with_timestamps() {
        let mut src = source(5);
        let mut seen = Vec::new();
        while let Some(frame) = src.next_frame().unwrap() {
            seen.push((frame.index, frame.timestamp_ms));
        }
        assert_eq!(seen, vec![(1, 0), (2, 250), (3, 500), (4, 750), (5, 1000)]);
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_seek_and_rewind() {
        let mut src = source(8);
        src.seek_ms(600).unwrap();
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 750);
        assert_eq!(frame.index, 4);

        src.seek_ms(500).unwrap();
        assert_eq!(src.next_frame().unwrap().unwrap().timestamp_ms, 500);

        src.seek_ms(60_000).unwrap();
        assert!(src.next_frame().unwrap().is_none());

        src.rewind().unwrap();
        assert_eq!(src.next_frame().unwrap().unwrap().index, 1);
    }

    #[test]
    fn test_progress_follows_position() {
        let mut src = source(4);
        assert_eq!(src.progress_percent(), Some(0.0));
        src.next_frame().unwrap();
        assert_eq!(src.progress_percent(), Some(25.0));
        src.seek_ms(60_000).unwrap();
        assert_eq!(src.progress_percent(), Some(100.0));
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(matches!(MemoryFrameSource::new(Vec::new(), 25.0), Err(AdSplitError::EmptyVideo)));
        assert!(MemoryFrameSource::new(vec![solid_frame(4, 4, 0)], 0.0).is_err());

        let mixed = vec![solid_frame(4, 4, 0), solid_frame(5, 4, 0)];
        assert!(MemoryFrameSource::new(mixed, 25.0).is_err());
    }

    #[test]
    fn test_properties() {
        let src = source(3);
        assert_eq!(src.len(), 3);
        assert!(!src.is_empty());
        assert_eq!((src.width(), src.height(), src.fps()), (16, 12, 4.0));
    }
}
