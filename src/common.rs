//! Common types, utilities, and error handling for the segmentation library.
//!
//! This module provides the foundational types used throughout the codebase,
//! including frame timecodes, timestamp formatting, and the crate error type.

use tracing::{instrument, trace};

/// Represents a specific point in time within a video
///
/// Encapsulates a 0-indexed frame position together with the framerate so
/// sources without a reliable clock can still derive millisecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimecode {
    frame_index: u64,
    fps: f64,
}

impl FrameTimecode {
    /// Create a new FrameTimecode
    ///
    /// # Arguments
    /// * `frame_index` - The frame position (0-indexed)
    /// * `fps` - Frames per second of the video
    ///
    /// # Panics
    /// Panics if fps is not positive (fail-fast approach)
    pub fn new(frame_index: u64, fps: f64) -> Self {
        assert!(fps > 0.0, "FPS must be positive, got: {}", fps);
        Self { frame_index, fps }
    }

    /// Get the frame position
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Get the framerate
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Convert to seconds since start of video
    pub fn seconds(&self) -> f64 {
        self.frame_index as f64 / self.fps
    }

    /// Convert to whole milliseconds since start of video
    #[instrument(skip(self))]
    pub fn milliseconds(&self) -> i64 {
        let ms = (self.seconds() * 1000.0).round() as i64;
        trace!("Frame {} at {}fps = {}ms", self.frame_index, self.fps, ms);
        ms
    }
}

/// Format a millisecond timestamp as `h:m:s` for human reading.
///
/// Hours wrap at 24 and no field is zero padded, so 3_723_000 ms reads `1:2:3`.
pub fn format_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let hours = (ms / (1000 * 60 * 60)) % 24;
    let mins = (ms / (1000 * 60)) % 60;
    let secs = (ms / 1000) % 60;
    format!("{}:{}:{}", hours, mins, secs)
}

/// All possible errors from the segmentation system
///
/// Covers every failure mode in the three passes, from video I/O issues to
/// export failures.
#[derive(Debug, thiserror::Error)]
pub enum AdSplitError {
    #[error("Failed to open video file: {path}")]
    VideoOpenFailed { path: String },

    #[error("Video file not found: {path}")]
    VideoNotFound { path: String },

    #[error("Invalid video format or corrupted file: {path}")]
    InvalidVideoFormat { path: String },

    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Frame processing failed at frame {frame}: {reason}")]
    FrameProcessingFailed { frame: u64, reason: String },

    #[error("No frames found in video")]
    EmptyVideo,

    #[error("Export to {path} failed: {reason}")]
    ExportFailed { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AdSplitError {
    /// Create a configuration error with a descriptive message
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// Create a frame processing error
    pub fn frame_error(frame: u64, reason: impl Into<String>) -> Self {
        Self::FrameProcessingFailed {
            frame,
            reason: reason.into()
        }
    }

    /// Create an export error for a specific output path
    pub fn export_error(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExportFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error (for unexpected conditions)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }
}

/// Convenient Result type for segmentation operations
pub type Result<T> = std::result::Result<T, AdSplitError>;
