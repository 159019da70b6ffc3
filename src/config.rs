//! Analyzer configuration
//!
//! Thresholds and timing knobs shared by the classification, refinement and
//! export passes. Frame size and framerate are not part of the configuration;
//! they are read from the frame source.

use serde::Serialize;
use tracing::debug;
use crate::common::{AdSplitError, Result};

/// Default seconds of logo stillness (and of uninterrupted content) before a
/// segment counts as PROGRAM.
pub const DEFAULT_MINIMUM_PROGRAM_SECONDS: u32 = 120;

/// Default full-frame mean at or below which a frame is black.
pub const DEFAULT_BLACK_THRESHOLD: f64 = 1.0;

/// Default corner mean at or above which a corner is still.
pub const DEFAULT_STILLNESS_THRESHOLD: f64 = 1.0;

/// Default mean of the coinciding edge map required for a logo match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 15.0;

/// Default pixels added around an extracted logo's bounding box.
pub const DEFAULT_LOGO_MARGIN: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerConfig {
    pub minimum_program_seconds: u32,
    pub black_threshold: f64,
    pub stillness_threshold: f64,
    pub match_threshold: f64,
    pub logo_margin: i32,
    /// Frames between stillness samples. `None` samples once per second of footage.
    pub sample_interval_frames: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            minimum_program_seconds: DEFAULT_MINIMUM_PROGRAM_SECONDS,
            black_threshold: DEFAULT_BLACK_THRESHOLD,
            stillness_threshold: DEFAULT_STILLNESS_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            logo_margin: DEFAULT_LOGO_MARGIN,
            sample_interval_frames: None,
        }
    }
}

impl AnalyzerConfig {
    /// Default configuration with a custom promotion threshold
    pub fn with_minimum_program_seconds(seconds: u32) -> Self {
        Self {
            minimum_program_seconds: seconds,
            ..Self::default()
        }
    }

    /// Validate that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.minimum_program_seconds == 0 {
            return Err(AdSplitError::config_error(
                "minimum program seconds must be positive"
            ));
        }
        for (name, value) in [
            ("black threshold", self.black_threshold),
            ("stillness threshold", self.stillness_threshold),
            ("match threshold", self.match_threshold),
        ] {
            if !(value >= 0.0) {
                return Err(AdSplitError::config_error(
                    format!("{} must be non-negative, got {}", name, value)
                ));
            }
        }
        if self.logo_margin < 0 {
            return Err(AdSplitError::config_error(
                format!("logo margin must be non-negative, got {}", self.logo_margin)
            ));
        }
        if self.sample_interval_frames == Some(0) {
            return Err(AdSplitError::config_error(
                "sample interval must be at least one frame"
            ));
        }
        debug!("Configuration validated: {:?}", self);
        Ok(())
    }

    /// Stillness sampling cadence for a source running at `fps`
    pub fn sample_interval(&self, fps: f64) -> u64 {
        self.sample_interval_frames
            .unwrap_or_else(|| fps.round().max(1.0) as u64)
    }

    /// Elapsed time after which a still-AD segment is promoted
    pub fn minimum_program_ms(&self) -> i64 {
        i64::from(self.minimum_program_seconds) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.minimum_program_seconds, 120);
        assert_eq!(config.black_threshold, 1.0);
        assert_eq!(config.stillness_threshold, 1.0);
        assert_eq!(config.match_threshold, 15.0);
        assert_eq!(config.logo_margin, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let zero = AnalyzerConfig::with_minimum_program_seconds(0);
        assert!(matches!(zero.validate(), Err(AdSplitError::InvalidConfig { .. })));

        let negative = AnalyzerConfig { match_threshold: -1.0, ..AnalyzerConfig::default() };
        assert!(negative.validate().is_err());

        let nan = AnalyzerConfig { black_threshold: f64::NAN, ..AnalyzerConfig::default() };
        assert!(nan.validate().is_err());

        let margin = AnalyzerConfig { logo_margin: -2, ..AnalyzerConfig::default() };
        assert!(margin.validate().is_err());

        let interval = AnalyzerConfig { sample_interval_frames: Some(0), ..AnalyzerConfig::default() };
        assert!(interval.validate().is_err());
    }

    #[test]
    fn test_sample_interval() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.sample_interval(25.0), 25);
        assert_eq!(config.sample_interval(29.97), 30);
        assert_eq!(config.sample_interval(0.2), 1);

        let fixed = AnalyzerConfig { sample_interval_frames: Some(7), ..AnalyzerConfig::default() };
        assert_eq!(fixed.sample_interval(25.0), 7);
    }

    #[test]
    fn test_minimum_program_ms() {
        assert_eq!(AnalyzerConfig::with_minimum_program_seconds(60).minimum_program_ms(), 60_000);
    }
}
