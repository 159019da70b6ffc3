//! Screen geometry and black-frame detection
//!
//! Logos live near the screen corners, so each corner gets a region of
//! interest: the full frame minus a horizontal margin of width/7 and a
//! vertical margin of height/5, anchored at that corner. The four regions
//! overlap around the center of the frame.
//!
//! ```text
//!   +---------+---+        TopLeft    = (0,  0,  w-mx, h-my)
//!   |  TL     |   |        TopRight   = (mx, 0,  w-mx, h-my)
//!   |    +----+---+        BottomLeft = (0,  my, w-mx, h-my)
//!   |    |    |   |        BottomRight= (mx, my, w-mx, h-my)
//!   +----+----+   |
//!   |    |     BR |
//!   +----+--------+
//! ```

use std::fmt;
use opencv::core::{Mat, Rect};
use serde::Serialize;
use crate::{common::Result, imaging};

/// Horizontal margin divisor
const WIDTH_FACTOR: i32 = 7;
/// Vertical margin divisor
const HEIGHT_FACTOR: i32 = 5;

/// A named screen corner
///
/// The declaration order is the priority order for every tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// All corners in priority order
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Position in [`Corner::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Corner::TopLeft => "top left",
            Corner::TopRight => "top right",
            Corner::BottomLeft => "bottom left",
            Corner::BottomRight => "bottom right",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a threshold a brightness comparison accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// mean <= threshold
    Darker,
    /// mean >= threshold
    Brighter,
}

impl Direction {
    pub fn accepts(self, mean: f64, threshold: f64) -> bool {
        match self {
            Direction::Darker => mean <= threshold,
            Direction::Brighter => mean >= threshold,
        }
    }
}

/// The four corner regions of a frame, fixed for the lifetime of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    width: i32,
    height: i32,
    regions: [Rect; 4],
}

impl ScreenGeometry {
    /// Derive the corner regions for a `width` x `height` frame
    ///
    /// # Panics
    /// Panics if either dimension is not positive
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width > 0 && height > 0,
                "Frame dimensions must be positive, got: {}x{}", width, height);

        let margin_x = width / WIDTH_FACTOR;
        let margin_y = height / HEIGHT_FACTOR;
        let region_w = width - margin_x;
        let region_h = height - margin_y;

        Self {
            width,
            height,
            regions: [
                Rect::new(0, 0, region_w, region_h),
                Rect::new(margin_x, 0, region_w, region_h),
                Rect::new(0, margin_y, region_w, region_h),
                Rect::new(margin_x, margin_y, region_w, region_h),
            ],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Region of interest for `corner`
    pub fn region(&self, corner: Corner) -> Rect {
        self.regions[corner.index()]
    }

    /// All regions paired with their corner, in priority order
    pub fn regions(&self) -> impl Iterator<Item = (Corner, Rect)> + '_ {
        Corner::ALL.iter().map(move |&c| (c, self.region(c)))
    }
}

/// Compare the mean of `region` (all channels) against `threshold`
pub fn region_passes(image: &Mat, region: Rect, direction: Direction, threshold: f64) -> Result<bool> {
    let mean = imaging::region_brightness(image, region)?;
    Ok(direction.accepts(mean, threshold))
}

/// True when the whole frame is at or below `threshold`
pub fn is_black(frame: &Mat, threshold: f64) -> Result<bool> {
    let mean = imaging::mean_brightness(frame)?;
    Ok(Direction::Darker.accepts(mean, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::*;

    #[test]
    fn test_corner_regions_1920x1080() {
        let geometry = ScreenGeometry::new(1920, 1080);
        // 1920 / 7 = 274, 1080 / 5 = 216
        assert_eq!(geometry.region(Corner::TopLeft), Rect::new(0, 0, 1646, 864));
        assert_eq!(geometry.region(Corner::TopRight), Rect::new(274, 0, 1646, 864));
        assert_eq!(geometry.region(Corner::BottomLeft), Rect::new(0, 216, 1646, 864));
        assert_eq!(geometry.region(Corner::BottomRight), Rect::new(274, 216, 1646, 864));
    }

    #[test]
    fn test_regions_stay_inside_frame() {
        for (w, h) in [(140, 100), (641, 479), (7, 5), (1, 1)] {
            let geometry = ScreenGeometry::new(w, h);
            for (_, r) in geometry.regions() {
                assert!(r.x >= 0 && r.y >= 0);
                assert!(r.x + r.width <= w && r.y + r.height <= h, "{:?} in {}x{}", r, w, h);
                assert!(r.width > 0 && r.height > 0);
            }
        }
    }

    #[test]
    #[should_panic(expected = "Frame dimensions must be positive")]
    fn test_zero_size_geometry() {
        ScreenGeometry::new(0, 100);
    }

    #[test]
    fn test_corner_priority_order() {
        let order: Vec<Corner> = ScreenGeometry::new(70, 50).regions().map(|(c, _)| c).collect();
        assert_eq!(order, Corner::ALL.to_vec());
        assert!(Corner::TopLeft < Corner::BottomRight);
        assert_eq!(Corner::BottomLeft.index(), 2);
        assert_eq!(Corner::TopRight.to_string(), "top right");
    }

    #[test]
    fn test_direction_boundaries() {
        assert!(Direction::Darker.accepts(1.0, 1.0));
        assert!(Direction::Darker.accepts(0.5, 1.0));
        assert!(!Direction::Darker.accepts(1.01, 1.0));
        assert!(Direction::Brighter.accepts(1.0, 1.0));
        assert!(!Direction::Brighter.accepts(0.99, 1.0));
    }

    #[test]
    fn test_is_black() {
        assert!(is_black(&solid_frame(64, 48, 0), 1.0).unwrap());
        assert!(is_black(&solid_frame(64, 48, 1), 1.0).unwrap());
        assert!(!is_black(&solid_frame(64, 48, 2), 1.0).unwrap());
        assert!(!is_black(&solid_frame(64, 48, 0x55), 1.0).unwrap());
    }

    #[test]
    fn test_region_passes() {
        let mut frame = solid_frame(140, 100, 0);
        fill_rect(&mut frame, Rect::new(5, 5, 10, 10), 255);
        let geometry = ScreenGeometry::new(140, 100);

        let tl = geometry.region(Corner::TopLeft);
        let br = geometry.region(Corner::BottomRight);
        assert!(region_passes(&frame, tl, Direction::Brighter, 1.0).unwrap());
        assert!(!region_passes(&frame, br, Direction::Brighter, 1.0).unwrap());
        assert!(region_passes(&frame, br, Direction::Darker, 1.0).unwrap());
    }
}
