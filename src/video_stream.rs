//! Video stream handling using OpenCV backend
//!
//! This module wraps OpenCV's VideoCapture as a [`FrameSource`], attaching the
//! presentation timestamp reported by the decoder to every frame.

use opencv::{videoio, core::Mat, prelude::*};
use tracing::{instrument, debug, warn, info};
use std::path::Path;
use crate::{
    common::{AdSplitError, FrameTimecode, Result},
    frame_source::{Frame, FrameSource},
};

/// Wrapper around OpenCV VideoCapture for consistent video reading
pub struct VideoStream {
    cap: videoio::VideoCapture,
    fps: f64,
    frame_count: i64,
    current_frame: u64,
    width: i32,
    height: i32,
    path: String,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// # Errors
    /// * `VideoNotFound` - If the file doesn't exist
    /// * `VideoOpenFailed` - If OpenCV can't open the file
    /// * `InvalidVideoFormat` - If the video reports an unusable framerate or size
    /// * `EmptyVideo` - If the video has no frames
    #[instrument(skip(path))]
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening video stream: {}", path);

        if !Path::new(path).exists() {
            return Err(AdSplitError::VideoNotFound {
                path: path.to_string()
            });
        }

        let cap = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)
            .map_err(|e| {
                warn!("Failed to create VideoCapture: {}", e);
                AdSplitError::VideoOpenFailed {
                    path: path.to_string()
                }
            })?;

        let is_opened = cap.is_opened().map_err(|e| {
            warn!("Failed to check if VideoCapture is opened: {}", e);
            AdSplitError::VideoOpenFailed {
                path: path.to_string()
            }
        })?;

        if !is_opened {
            return Err(AdSplitError::VideoOpenFailed {
                path: path.to_string()
            });
        }

        let property = |id: i32, name: &str| -> Result<f64> {
            cap.get(id).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                AdSplitError::InvalidVideoFormat {
                    path: path.to_string()
                }
            })
        };

        let fps = property(videoio::CAP_PROP_FPS, "FPS")?;
        let frame_count = property(videoio::CAP_PROP_FRAME_COUNT, "frame count")? as i64;
        let width = property(videoio::CAP_PROP_FRAME_WIDTH, "frame width")? as i32;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT, "frame height")? as i32;

        if !(fps > 0.0) {
            return Err(AdSplitError::InvalidVideoFormat {
                path: path.to_string()
            });
        }

        if frame_count <= 0 {
            return Err(AdSplitError::EmptyVideo);
        }

        if width <= 0 || height <= 0 {
            return Err(AdSplitError::InvalidVideoFormat {
                path: path.to_string()
            });
        }

        info!("Video opened successfully - FPS: {}, Frames: {}, Size: {}x{}",
              fps, frame_count, width, height);

        Ok(Self {
            cap,
            fps,
            frame_count,
            current_frame: 0,
            width,
            height,
            path: path.to_string(),
        })
    }

    /// Read the next frame from the video
    ///
    /// # Errors
    /// * `FrameProcessingFailed` - If frame reading fails or the frame size
    ///   differs from the size reported when the stream was opened
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();

        let success = self.cap.read(&mut frame).map_err(|e| {
            AdSplitError::frame_error(
                self.current_frame,
                format!("OpenCV read failed: {}", e)
            )
        })?;

        if success && !frame.empty() {
            self.current_frame += 1;

            check_frame_size(self.current_frame, frame.cols(), frame.rows(), self.width, self.height)?;
            Ok(Some(frame))
        } else {
            debug!("Reached end of video at frame {}", self.current_frame);
            Ok(None)
        }
    }

    /// Timestamp of the frame just read
    ///
    /// Falls back to the nominal frame time when the decoder reports nothing usable.
    fn current_timestamp_ms(&self) -> i64 {
        let nominal = FrameTimecode::new(self.current_frame.saturating_sub(1), self.fps).milliseconds();
        match self.cap.get(videoio::CAP_PROP_POS_MSEC) {
            Ok(ms) if ms.is_finite() && ms >= 0.0 => {
                // some backends report 0 for every frame
                if ms == 0.0 && self.current_frame > 1 {
                    nominal
                } else {
                    ms.round() as i64
                }
            }
            _ => nominal,
        }
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / self.fps
    }
}

/// Every pass assumes one frame size for the whole stream
fn check_frame_size(frame: u64, cols: i32, rows: i32, width: i32, height: i32) -> Result<()> {
    if cols != width || rows != height {
        warn!("Frame {} is {}x{}, stream opened as {}x{}", frame, cols, rows, width, height);
        return Err(AdSplitError::frame_error(
            frame,
            format!("frame size changed to {}x{}, expected {}x{}", cols, rows, width, height)
        ));
    }
    Ok(())
}

impl FrameSource for VideoStream {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.read_frame()? else {
            return Ok(None);
        };
        Ok(Some(Frame {
            image,
            timestamp_ms: self.current_timestamp_ms(),
            index: self.current_frame,
        }))
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn seek_ms(&mut self, timestamp_ms: i64) -> Result<()> {
        let target = timestamp_ms.max(0) as f64;
        let positioned = self.cap.set(videoio::CAP_PROP_POS_MSEC, target)?;
        if !positioned {
            let frame = (target / 1000.0 * self.fps).round();
            warn!("Millisecond seek unsupported, seeking to frame {}", frame);
            if !self.cap.set(videoio::CAP_PROP_POS_FRAMES, frame)? {
                return Err(AdSplitError::frame_error(
                    frame as u64,
                    format!("seek to {}ms failed", timestamp_ms)
                ));
            }
        }

        self.current_frame = self.cap.get(videoio::CAP_PROP_POS_FRAMES)?.max(0.0) as u64;
        debug!("Seeked to {}ms (frame {})", timestamp_ms, self.current_frame);
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
        Some((self.current_frame as f64 / self.frame_count as f64 * 100.0).min(100.0))
    }
}

impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("fps", &self.fps)
            .field("frame_count", &self.frame_count)
            .field("current_frame", &self.current_frame)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
