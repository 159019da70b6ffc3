//! Corner stillness tracking
//!
//! Sampled frames are folded into a rolling bitwise intersection. Content that
//! changes between samples is driven toward black, while a static overlay such
//! as a broadcaster logo keeps its pixels. Each corner keeps a count of
//! consecutive samples in which its region of the rolling image is still lit.
//!
//! Once a logo has been taken from a corner the tracker is disarmed: no corner
//! is offered again until every counter has dropped back to zero.

use opencv::{core::Mat, prelude::*};
use tracing::{debug, instrument, trace};
use crate::{
    common::Result,
    geometry::{self, Corner, Direction, ScreenGeometry},
    imaging,
};

/// Result of feeding one sample to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// First sample; the rolling image was initialized and no corner was evaluated
    Seeded,
    /// Corners were evaluated against the updated rolling image
    Evaluated {
        /// Every counter read zero, so the rolling image was reseeded from this frame
        reseeded: bool,
    },
}

pub struct StillnessTracker {
    counters: [u32; 4],
    rolling: Option<Mat>,
    threshold: f64,
    samples: u64,
    armed: bool,
}

impl StillnessTracker {
    /// Create a tracker whose corners count as still while their rolling
    /// mean stays at or above `threshold`
    pub fn new(threshold: f64) -> Self {
        assert!(threshold >= 0.0, "Stillness threshold must be non-negative, got: {}", threshold);
        Self {
            counters: [0; 4],
            rolling: None,
            threshold,
            samples: 0,
            armed: true,
        }
    }

    /// Fold one sampled frame into the rolling image and update every corner
    #[instrument(skip(self, frame, geometry))]
    pub fn sample(&mut self, frame: &Mat, geometry: &ScreenGeometry) -> Result<SampleOutcome> {
        self.samples += 1;

        let rolling = match self.rolling.take() {
            None => {
                debug!("Seeding rolling intersection image");
                self.rolling = Some(frame.try_clone()?);
                return Ok(SampleOutcome::Seeded);
            }
            Some(previous) => imaging::bitwise_and(&previous, frame)?,
        };

        for (corner, region) in geometry.regions() {
            let still = geometry::region_passes(&rolling, region, Direction::Brighter, self.threshold)?;
            let counter = &mut self.counters[corner.index()];
            *counter = if still { *counter + 1 } else { 0 };
        }
        trace!("Stillness counters after sample {}: {:?}", self.samples, self.counters);

        let reseeded = self.total() == 0;
        if reseeded && !self.armed {
            debug!("Stillness lost, logo discovery re-armed");
            self.armed = true;
        }
        self.rolling = Some(if reseeded {
            trace!("No corner is still, reseeding rolling image");
            frame.try_clone()?
        } else {
            rolling
        });

        Ok(SampleOutcome::Evaluated { reseeded })
    }

    /// First corner, in priority order, whose counter exceeds `minimum`
    ///
    /// Always `None` while disarmed.
    pub fn candidate(&self, minimum: u32) -> Option<Corner> {
        if !self.armed {
            return None;
        }
        Corner::ALL
            .into_iter()
            .find(|c| self.counters[c.index()] > minimum)
    }

    pub fn counter(&self, corner: Corner) -> u32 {
        self.counters[corner.index()]
    }

    pub fn counters(&self) -> [u32; 4] {
        self.counters
    }

    /// Sum of all four counters
    pub fn total(&self) -> u32 {
        self.counters.iter().sum()
    }

    /// Current rolling intersection image, if seeded
    pub fn rolling_image(&self) -> Option<&Mat> {
        self.rolling.as_ref()
    }

    /// Number of samples taken so far
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Whether a still corner may currently be offered as a logo candidate
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Stop offering candidates until stillness is lost everywhere
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl std::fmt::Debug for StillnessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillnessTracker")
            .field("counters", &self.counters)
            .field("threshold", &self.threshold)
            .field("samples", &self.samples)
            .field("seeded", &self.rolling.is_some())
            .field("armed", &self.armed)
            .finish()
    }
}
