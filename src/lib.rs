//! Broadcast stream segmentation into AD and PROGRAM segments
//!
//! A recording is split at black frames into segments. A segment becomes
//! PROGRAM once a channel logo is seen in it, either by matching a logo that
//! was already discovered or by discovering a new one from a screen corner
//! that stays still for long enough, or simply by lasting long enough.
//!
//! Processing runs in three passes over the source:
//! 1. [`analyze`] classifies segments and discovers logos
//! 2. [`refine`] narrows PROGRAM segments to the frames where a logo is visible
//! 3. [`export`] writes segment videos, logo crops and a metadata document
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rust_adsplit::{run_pipeline, AnalyzerConfig, PipelineOptions};
//!
//! let config = AnalyzerConfig::default();
//! let channel = run_pipeline("recording.mp4", config, &PipelineOptions::default())?;
//! for segment in channel.segments() {
//!     println!("{}", segment);
//! }
//! # Ok::<(), rust_adsplit::AdSplitError>(())
//! ```

mod common;
mod config;
mod geometry;
mod imaging;
mod stillness;
mod logo;
mod matcher;
mod segment;
mod classifier;
mod refiner;
mod exporter;
mod frame_source;
mod video_stream;

pub use common::{format_timestamp, AdSplitError, FrameTimecode, Result};
pub use config::{
    AnalyzerConfig, DEFAULT_BLACK_THRESHOLD, DEFAULT_LOGO_MARGIN, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_MINIMUM_PROGRAM_SECONDS, DEFAULT_STILLNESS_THRESHOLD,
};
pub use geometry::{is_black, region_passes, Corner, Direction, ScreenGeometry};
pub use stillness::{SampleOutcome, StillnessTracker};
pub use logo::{extract_logo, locate_logo, BoundingBox, Logo, LogoCandidate};
pub use matcher::{first_match, match_score, matches};
pub use segment::{Channel, Segment, SegmentKind};
pub use classifier::{classify, SegmentClassifier, Transition};
pub use refiner::{refine_bounds, refine_segments, RefinedBounds};
pub use exporter::{build_metadata, write_metadata, ExportSummary, LogoRecord, Metadata, SegmentRecord};
pub use frame_source::{Frame, FrameSource, MemoryFrameSource};
pub use video_stream::VideoStream;

use std::path::PathBuf;
use tracing::{instrument, info};

/// First pass: classify the whole source into segments and discover logos
///
/// # Errors
/// * `InvalidConfig` - If `config` is unusable for this source
/// * `FrameProcessingFailed` / `OpenCvError` - If a frame cannot be read or analyzed
#[instrument(skip(source, config))]
pub fn analyze<S: FrameSource>(source: &mut S, config: AnalyzerConfig) -> Result<Channel> {
    let mut channel = Channel::new(source.width(), source.height(), source.fps(), config)?;
    classify(source, &mut channel)?;

    info!("Analysis completed. Found {} segments ({} PROGRAM) and {} logos",
          channel.segments().len(),
          channel.segments().iter().filter(|s| s.is_program()).count(),
          channel.logos().len());

    Ok(channel)
}

/// Second pass: narrow PROGRAM segments to their logo-visible span
pub fn refine<S: FrameSource>(source: &mut S, channel: &mut Channel) -> Result<Vec<RefinedBounds>> {
    refine_segments(source, channel)
}

/// Third pass: write segment videos, logo images and `metadata.json` under `output_dir`
pub fn export<S: FrameSource>(
    source: &mut S,
    channel: &Channel,
    source_name: &str,
    output_dir: &std::path::Path,
) -> Result<ExportSummary> {
    exporter::export(source, channel, source_name, output_dir)
}

/// Which passes [`run_pipeline`] runs and where it writes
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub refine: bool,
    pub export: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            refine: true,
            export: true,
        }
    }
}

/// Run every enabled pass over the video at `video_path`
///
/// Each pass reopens the file. Nothing is written before analysis succeeds.
#[instrument(skip(config, options))]
pub fn run_pipeline(video_path: &str, config: AnalyzerConfig, options: &PipelineOptions) -> Result<Channel> {
    info!("Starting segmentation for: {}", video_path);

    let mut stream = VideoStream::open(video_path)?;
    let mut channel = analyze(&mut stream, config)?;

    if options.refine {
        let mut stream = VideoStream::open(video_path)?;
        refine(&mut stream, &mut channel)?;
    }

    if options.export {
        let mut stream = VideoStream::open(video_path)?;
        export(&mut stream, &channel, video_path, &options.output_dir)?;
    }

    Ok(channel)
}

/// Get video information without analyzing it
#[instrument]
pub fn get_video_info(video_path: &str) -> Result<VideoInfo> {
    let video_stream = VideoStream::open(video_path)?;

    Ok(VideoInfo {
        path: video_path.to_string(),
        fps: video_stream.fps(),
        frame_count: video_stream.frame_count().max(0) as u64,
        width: video_stream.width() as u32,
        height: video_stream.height() as u32,
        duration_seconds: video_stream.duration_seconds(),
    })
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoInfo {
    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({} duration)",
            self.width, self.height, self.fps, self.frame_count,
            format_timestamp((self.duration_seconds * 1000.0).round() as i64)
        )
    }

    /// Check if this appears to be a valid video configuration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0
            && self.frame_count > 0
            && self.width > 0
            && self.height > 0
            && self.duration_seconds > 0.0
    }

    /// Frames between stillness samples under `config`
    pub fn sample_interval(&self, config: &AnalyzerConfig) -> u64 {
        config.sample_interval(self.fps)
    }
}

/// Initialize tracing for the library
///
/// `level` is a filter directive such as "debug" or "info"; `RUST_LOG` takes
/// precedence when set.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Ad segmentation initialized with tracing level: {}", level);
}
