//! Segments and the per-stream channel state
//!
//! A [`Channel`] is the single owner of everything learned about one input
//! stream: its geometry, the stillness tracker, the closed segments and the
//! logo registry. Segments and logos are append-only and addressed by id.

use std::fmt;
use opencv::core::Mat;
use serde::Serialize;
use tracing::{debug, info, instrument};
use crate::{
    common::{format_timestamp, AdSplitError, Result},
    config::AnalyzerConfig,
    geometry::{Corner, ScreenGeometry},
    logo::{self, Logo},
    stillness::{SampleOutcome, StillnessTracker},
};

/// Classification of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Ad,
    Program,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Ad => f.write_str("AD"),
            SegmentKind::Program => f.write_str("PROGRAM"),
        }
    }
}

/// A contiguous run of non-black frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub id: u32,
    pub start_ms: i64,
    pub end_ms: i64,
    pub kind: SegmentKind,
    /// Id of the logo that marked this segment as PROGRAM
    pub logo: Option<u32>,
}

impl Segment {
    /// A new AD segment starting (and provisionally ending) at `start_ms`
    pub fn open(id: u32, start_ms: i64) -> Self {
        Self {
            id,
            start_ms,
            end_ms: start_ms,
            kind: SegmentKind::Ad,
            logo: None,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Whether `timestamp_ms` lies within `[start_ms, end_ms]`
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms <= self.end_ms
    }

    pub fn is_program(&self) -> bool {
        self.kind == SegmentKind::Program
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment {} [{} - {}] {}",
               self.id, format_timestamp(self.start_ms), format_timestamp(self.end_ms), self.kind)?;
        if let Some(logo) = self.logo {
            write!(f, " (logo {})", logo)?;
        }
        Ok(())
    }
}

/// All state accumulated for one input stream
pub struct Channel {
    fps: f64,
    geometry: ScreenGeometry,
    config: AnalyzerConfig,
    stillness: StillnessTracker,
    segments: Vec<Segment>,
    logos: Vec<Logo>,
    last_segment_id: u32,
}

impl Channel {
    /// Create a channel for a `width` x `height` stream at `fps`
    ///
    /// # Errors
    /// * `InvalidConfig` - If the configuration or stream properties are unusable
    pub fn new(width: i32, height: i32, fps: f64, config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        if !(fps > 0.0) {
            return Err(AdSplitError::config_error(format!("fps must be positive, got {}", fps)));
        }
        if width <= 0 || height <= 0 {
            return Err(AdSplitError::config_error(
                format!("frame size must be positive, got {}x{}", width, height)
            ));
        }

        debug!("Created channel {}x{} at {}fps", width, height, fps);

        Ok(Self {
            fps,
            geometry: ScreenGeometry::new(width, height),
            stillness: StillnessTracker::new(config.stillness_threshold),
            config,
            segments: Vec::new(),
            logos: Vec::new(),
            last_segment_id: 0,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn geometry(&self) -> &ScreenGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Closed segments in the order they were closed
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Registered logos in discovery order
    pub fn logos(&self) -> &[Logo] {
        &self.logos
    }

    pub fn logo(&self, id: u32) -> Option<&Logo> {
        self.logos.iter().find(|l| l.id() == id)
    }

    pub fn stillness(&self) -> &StillnessTracker {
        &self.stillness
    }

    /// Allocate the id for the next segment
    pub(crate) fn next_segment_id(&mut self) -> u32 {
        self.last_segment_id += 1;
        self.last_segment_id
    }

    /// Append a closed segment
    pub(crate) fn push_segment(&mut self, segment: Segment) {
        debug_assert!(
            self.segments.last().map_or(true, |last| last.id < segment.id),
            "segment ids must increase"
        );
        info!("Closed {}", segment);
        self.segments.push(segment);
    }

    /// Narrow the bounds of a closed segment; returns false for an unknown id
    pub(crate) fn update_bounds(&mut self, id: u32, start_ms: i64, end_ms: i64) -> bool {
        match self.segments.iter_mut().find(|s| s.id == id) {
            Some(segment) => {
                segment.start_ms = start_ms;
                segment.end_ms = end_ms;
                true
            }
            None => false,
        }
    }

    /// Feed one sampled frame to the stillness tracker
    pub(crate) fn sample_stillness(&mut self, frame: &Mat) -> Result<SampleOutcome> {
        self.stillness.sample(frame, &self.geometry)
    }

    /// Corner ready for logo extraction, if any
    ///
    /// After a registration no corner is offered until stillness has been
    /// lost in every corner, so one persistent overlay yields one logo.
    pub(crate) fn logo_candidate_corner(&self) -> Option<Corner> {
        self.stillness.candidate(self.config.minimum_program_seconds)
    }

    /// Extract a logo from `corner` of `frame` and register it
    ///
    /// Returns the new logo id, or `None` when extraction degenerated to an
    /// empty box (nothing is registered then).
    #[instrument(skip(self, frame))]
    pub(crate) fn discover_logo(&mut self, frame: &Mat, corner: Corner) -> Result<Option<u32>> {
        let rolling = match self.stillness.rolling_image() {
            Some(rolling) => rolling,
            None => return Ok(None),
        };

        let candidate = logo::extract_logo(frame, rolling, corner, &self.geometry, self.config.logo_margin)?;
        if candidate.is_empty() {
            debug!("Discarding empty logo candidate in {} corner", corner);
            return Ok(None);
        }

        let id = self.logos.last().map_or(1, |l| l.id() + 1);
        info!("Registered logo {} in {} corner at {:?}", id, corner, candidate.bounding_box);
        self.logos.push(Logo::from_candidate(id, candidate));
        self.stillness.disarm();
        Ok(Some(id))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("fps", &self.fps)
            .field("geometry", &self.geometry)
            .field("config", &self.config)
            .field("stillness", &self.stillness)
            .field("segments", &self.segments)
            .field("logos", &self.logos)
            .finish()
    }
}
